use serde::{Deserialize, Serialize};

use rolo_domain::{LogicalContactId, RawRecordId, ids::FieldRowId};

use crate::{
	CancelFn, ContactsService, Error, LinkPlan, NameSource, Result, checkpoint, never_cancel,
	priority,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinkRequest {
	pub primary: LogicalContactId,
	#[serde(default)]
	pub others: Vec<LogicalContactId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinkResponse {
	/// The merged contact. `None` when the store could not report it after the commit.
	pub contact_id: Option<LogicalContactId>,
	pub raw_record_ids: Vec<RawRecordId>,
	/// The name row marked default after the merge, if any.
	pub default_name_row_id: Option<FieldRowId>,
	pub links_submitted: usize,
}

impl ContactsService {
	pub async fn link(&self, req: LinkRequest) -> Result<LinkResponse> {
		self.link_with_cancel(req, never_cancel()).await
	}

	pub async fn link_with_cancel(
		&self,
		req: LinkRequest,
		cancel: &CancelFn<'_>,
	) -> Result<LinkResponse> {
		self.ensure_write()?;

		if self.cfg.aggregation.restore_default_name {
			self.ensure_read()?;
		}

		let ordered_ids = priority::ordered_candidates(req.primary, &req.others)?;

		for contact_id in &ordered_ids {
			let Some(contact) = self.store.logical_contact(*contact_id).await? else {
				// Ids retired by an earlier merge contribute no raw records.
				if *contact_id == req.primary {
					return Err(Error::NotFound {
						message: format!("Contact {contact_id} does not exist."),
					});
				}

				tracing::debug!(contact_id = %contact_id, "Skipping a retired contact.");

				continue;
			};

			if contact.is_profile {
				return Err(Error::InvalidRequest {
					message: format!("Contact {contact_id} is the profile and cannot be linked."),
				});
			}
		}

		let default_name = if self.cfg.aggregation.restore_default_name {
			self.default_name_source(&ordered_ids, cancel).await?
		} else {
			None
		};

		checkpoint(cancel, "planning")?;

		let plan = self.plan_links(&ordered_ids).await?;

		checkpoint(cancel, "submit")?;

		let receipt = self.store.submit_batch(&plan.mutations()).await.map_err(Error::rejected)?;

		tracing::info!(
			contacts = ordered_ids.len(),
			raw_records = plan.raw_record_ids.len(),
			links = receipt.mutations,
			"Contacts linked."
		);

		let default_name_row_id = match default_name {
			Some(source) => match self.apply_default(source.field_row_id).await {
				Ok(_) => Some(source.field_row_id),
				Err(err) => {
					tracing::warn!(
						error = %err,
						field_row_id = %source.field_row_id,
						"Failed to restore the default name after linking."
					);

					None
				},
			},
			None => None,
		};
		let contact_id = self.merged_contact_id(default_name.as_ref(), &plan).await;

		Ok(LinkResponse {
			contact_id,
			raw_record_ids: plan.raw_record_ids,
			default_name_row_id,
			links_submitted: receipt.mutations,
		})
	}

	/// Links the first contact with the rest.
	pub async fn link_all(&self, contact_ids: &[LogicalContactId]) -> Result<LinkResponse> {
		self.link_all_with_cancel(contact_ids, never_cancel()).await
	}

	pub async fn link_all_with_cancel(
		&self,
		contact_ids: &[LogicalContactId],
		cancel: &CancelFn<'_>,
	) -> Result<LinkResponse> {
		let Some((primary, others)) = contact_ids.split_first() else {
			return Err(Error::InsufficientCandidates { found: 0 });
		};

		self.link_with_cancel(LinkRequest { primary: *primary, others: others.to_vec() }, cancel)
			.await
	}

	async fn merged_contact_id(
		&self,
		default_name: Option<&NameSource>,
		plan: &LinkPlan,
	) -> Option<LogicalContactId> {
		if let Some(source) = default_name {
			match self.store.field_row(source.field_row_id).await {
				Ok(Some(row)) => return Some(row.logical_contact_id),
				Ok(None) => {},
				Err(err) => tracing::warn!(
					error = %err,
					field_row_id = %source.field_row_id,
					"Failed to read the default name row after linking."
				),
			}
		}

		let first = plan.raw_record_ids.first().copied()?;

		match self.store.logical_contact_id_of(first).await {
			Ok(contact_id) => contact_id,
			Err(err) => {
				tracing::warn!(
					error = %err,
					raw_record_id = %first,
					"Failed to read the merged contact after linking."
				);

				None
			},
		}
	}
}
