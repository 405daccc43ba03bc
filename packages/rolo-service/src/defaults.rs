use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rolo_domain::{FieldKind, FieldRow, LogicalContactId, RawRecordId, field, ids::FieldRowId};
use rolo_storage::{FieldFlag, FieldQuery, Mutation, RowSelector};

use crate::{CancelFn, ContactsService, Error, Result, checkpoint, never_cancel};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DefaultResponse {
	pub field_row_id: FieldRowId,
	pub kind: FieldKind,
	pub raw_record_id: RawRecordId,
	pub logical_contact_id: LogicalContactId,
	pub is_default: bool,
}

/// Clears the primary flag among the row's siblings in its raw record and the super-primary
/// flag among its siblings in its contact. With `set`, the row then takes both flags.
pub fn default_batch(row: &FieldRow, set: bool) -> Vec<Mutation> {
	let kind = row.kind();
	let mut batch = vec![
		Mutation::ClearFlag {
			selector: RowSelector::RawRecord { raw_record_id: row.raw_record_id, kind },
			flag: FieldFlag::Primary,
		},
		Mutation::ClearFlag {
			selector: RowSelector::LogicalContact {
				logical_contact_id: row.logical_contact_id,
				kind,
			},
			flag: FieldFlag::SuperPrimary,
		},
	];

	if set {
		batch.push(Mutation::SetFlags {
			field_row_id: row.id,
			is_primary: Some(true),
			is_super_primary: Some(true),
		});
	}

	batch
}

impl ContactsService {
	pub async fn set_as_default(&self, field_row_id: FieldRowId) -> Result<DefaultResponse> {
		self.set_as_default_with_cancel(field_row_id, never_cancel()).await
	}

	pub async fn set_as_default_with_cancel(
		&self,
		field_row_id: FieldRowId,
		cancel: &CancelFn<'_>,
	) -> Result<DefaultResponse> {
		self.ensure_write()?;
		self.change_default(field_row_id, true, cancel).await
	}

	pub async fn clear_default(&self, field_row_id: FieldRowId) -> Result<DefaultResponse> {
		self.clear_default_with_cancel(field_row_id, never_cancel()).await
	}

	pub async fn clear_default_with_cancel(
		&self,
		field_row_id: FieldRowId,
		cancel: &CancelFn<'_>,
	) -> Result<DefaultResponse> {
		self.ensure_write()?;
		self.change_default(field_row_id, false, cancel).await
	}

	/// The current default row of every kind that has one, in kind order.
	pub async fn defaults_of_contact(&self, contact_id: LogicalContactId) -> Result<Vec<FieldRow>> {
		self.defaults_of_contact_with_cancel(contact_id, never_cancel()).await
	}

	pub async fn defaults_of_contact_with_cancel(
		&self,
		contact_id: LogicalContactId,
		cancel: &CancelFn<'_>,
	) -> Result<Vec<FieldRow>> {
		self.ensure_read()?;

		if self.store.logical_contact(contact_id).await?.is_none() {
			return Err(Error::NotFound {
				message: format!("Contact {contact_id} does not exist."),
			});
		}

		checkpoint(cancel, "reading field rows")?;

		let rows = self.store.field_rows(&FieldQuery::for_contact(contact_id)).await?;
		let mut by_kind: BTreeMap<FieldKind, Vec<FieldRow>> = BTreeMap::new();

		for row in rows {
			by_kind.entry(row.kind()).or_default().push(row);
		}

		Ok(by_kind.values().filter_map(|rows| field::default_of(rows).cloned()).collect())
	}

	/// Marks a row default on behalf of an operation that already checked write access.
	pub(crate) async fn apply_default(&self, field_row_id: FieldRowId) -> Result<DefaultResponse> {
		self.change_default(field_row_id, true, never_cancel()).await
	}

	async fn change_default(
		&self,
		field_row_id: FieldRowId,
		set: bool,
		cancel: &CancelFn<'_>,
	) -> Result<DefaultResponse> {
		if !field_row_id.is_valid() {
			return Err(Error::InvalidRequest {
				message: format!("Field row id {field_row_id} is not a stored row."),
			});
		}

		let row = self.store.field_row(field_row_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Field row {field_row_id} does not exist."),
		})?;

		checkpoint(cancel, "submit")?;

		let batch = default_batch(&row, set);

		self.store.submit_batch(&batch).await.map_err(Error::rejected)?;

		tracing::info!(
			field_row_id = %row.id,
			kind = row.kind().as_str(),
			contact_id = %row.logical_contact_id,
			is_default = set,
			"Default updated."
		);

		Ok(DefaultResponse {
			field_row_id: row.id,
			kind: row.kind(),
			raw_record_id: row.raw_record_id,
			logical_contact_id: row.logical_contact_id,
			is_default: set,
		})
	}
}
