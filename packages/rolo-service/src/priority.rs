//! Picks the order of contacts to link and the name the merged contact should keep.
//!
//! Name resolution runs in two passes over the ordered contacts. The first pass only
//! accepts settled names: the store's own name source, then a super-primary name. The
//! second pass falls back to the most recently modified name. A settled name on a later
//! contact therefore beats a guessed name on the primary.

use serde::{Deserialize, Serialize};

use rolo_domain::{
	DisplayNameSource, FieldKind, FieldRow, LogicalContactId, RawRecordId, aggregation,
	ids::FieldRowId,
};
use rolo_storage::{FieldOrder, FieldQuery};

use crate::{CancelFn, ContactsService, Error, Result, checkpoint, never_cancel};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NameSource {
	pub field_row_id: FieldRowId,
	pub raw_record_id: RawRecordId,
	pub logical_contact_id: LogicalContactId,
}
impl From<&FieldRow> for NameSource {
	fn from(row: &FieldRow) -> Self {
		Self {
			field_row_id: row.id,
			raw_record_id: row.raw_record_id,
			logical_contact_id: row.logical_contact_id,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Priority {
	pub ordered_ids: Vec<LogicalContactId>,
	pub default_name: Option<NameSource>,
}

/// Requested primary first, then the other valid ids deduplicated and ascending.
pub fn ordered_candidates(
	primary: LogicalContactId,
	others: &[LogicalContactId],
) -> Result<Vec<LogicalContactId>> {
	let ordered = aggregation::order_candidates(primary, others);

	if ordered.len() < 2 {
		return Err(Error::InsufficientCandidates { found: ordered.len() });
	}

	Ok(ordered)
}

impl ContactsService {
	pub async fn resolve_priority(
		&self,
		primary: LogicalContactId,
		others: &[LogicalContactId],
	) -> Result<Priority> {
		self.resolve_priority_with_cancel(primary, others, never_cancel()).await
	}

	pub async fn resolve_priority_with_cancel(
		&self,
		primary: LogicalContactId,
		others: &[LogicalContactId],
		cancel: &CancelFn<'_>,
	) -> Result<Priority> {
		self.ensure_read()?;

		let ordered_ids = ordered_candidates(primary, others)?;
		let default_name = self.default_name_source(&ordered_ids, cancel).await?;

		Ok(Priority { ordered_ids, default_name })
	}

	pub(crate) async fn default_name_source(
		&self,
		ordered_ids: &[LogicalContactId],
		cancel: &CancelFn<'_>,
	) -> Result<Option<NameSource>> {
		for contact_id in ordered_ids {
			checkpoint(cancel, "name resolution")?;

			if let Some(row) = self.settled_name(*contact_id).await? {
				return Ok(Some(NameSource::from(&row)));
			}
		}
		for contact_id in ordered_ids {
			checkpoint(cancel, "name resolution")?;

			if let Some(row) = self.most_recent_name(*contact_id).await? {
				return Ok(Some(NameSource::from(&row)));
			}
		}

		Ok(None)
	}

	async fn settled_name(&self, contact_id: LogicalContactId) -> Result<Option<FieldRow>> {
		let Some(contact) = self.store.logical_contact(contact_id).await? else {
			return Ok(None);
		};

		if contact.display_name_source == DisplayNameSource::StructuredName
			&& let Some(raw_record_id) = contact.name_raw_record_id
		{
			let query = FieldQuery::for_raw_record(raw_record_id)
				.kind(FieldKind::Name)
				.order(FieldOrder::DefaultThenMostRecent);
			let rows = self.store.field_rows(&query).await?;

			if let Some(row) = rows.into_iter().find(|row| !row.value.is_blank()) {
				return Ok(Some(row));
			}
		}

		// A contact holds at most one super-primary row per kind, and it sorts first.
		let query = FieldQuery::for_contact(contact_id)
			.kind(FieldKind::Name)
			.order(FieldOrder::DefaultThenMostRecent)
			.limit(1);
		let row = self.store.first_field_row(&query).await?;

		Ok(row.filter(|row| row.is_super_primary && !row.value.is_blank()))
	}

	async fn most_recent_name(&self, contact_id: LogicalContactId) -> Result<Option<FieldRow>> {
		let query = FieldQuery::for_contact(contact_id).kind(FieldKind::Name);
		let rows = self.store.field_rows(&query).await?;

		Ok(rows.into_iter().filter(|row| !row.value.is_blank()).min_by(|a, b| {
			b.last_modified.cmp(&a.last_modified).then_with(|| a.id.cmp(&b.id))
		}))
	}
}
