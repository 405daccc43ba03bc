use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use rolo_domain::{AggregationLink, AggregationMode, LogicalContactId, RawRecordId, aggregation};
use rolo_storage::Mutation;

use crate::{CancelFn, ContactsService, Error, Result, checkpoint, never_cancel};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnlinkResponse {
	pub raw_record_id: RawRecordId,
	/// The record's own contact first, then the contacts its former peers now belong to.
	pub contact_ids: Vec<LogicalContactId>,
	pub links_removed: usize,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnlinkContactResponse {
	pub raw_record_ids: Vec<RawRecordId>,
	pub contact_ids: Vec<LogicalContactId>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnlinkFailure {
	pub raw_record_id: RawRecordId,
	pub code: String,
	pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnlinkManyResponse {
	pub unlinked: Vec<UnlinkResponse>,
	pub failed: Vec<UnlinkFailure>,
	/// Set when the cancel predicate stopped the loop. Records after that point were not
	/// attempted.
	pub cancelled: bool,
}

impl ContactsService {
	/// Detaches one raw record from every record it is aggregated with.
	pub async fn unlink(&self, raw_record_id: RawRecordId) -> Result<UnlinkResponse> {
		self.unlink_with_cancel(raw_record_id, never_cancel()).await
	}

	pub async fn unlink_with_cancel(
		&self,
		raw_record_id: RawRecordId,
		cancel: &CancelFn<'_>,
	) -> Result<UnlinkResponse> {
		self.ensure_write()?;

		let not_found =
			|| Error::NotFound { message: format!("Raw record {raw_record_id} does not exist.") };

		if !raw_record_id.is_valid() {
			return Err(not_found());
		}

		let raw = self.store.raw_record(raw_record_id).await?.ok_or_else(not_found)?;

		if raw.is_profile {
			return Err(Error::InvalidRequest {
				message: format!("Raw record {raw_record_id} belongs to the profile."),
			});
		}

		checkpoint(cancel, "reading links")?;

		let links = self.store.aggregation_links_for(raw_record_id).await?;
		let mut peers: BTreeSet<RawRecordId> = links
			.iter()
			.filter(|link| link.mode == AggregationMode::KeepTogether)
			.filter_map(|link| link.other(raw_record_id))
			.collect();

		peers.extend(
			self.store
				.raw_record_ids(&[raw.logical_contact_id])
				.await?
				.into_iter()
				.filter(|id| *id != raw_record_id),
		);

		if peers.is_empty() {
			tracing::debug!(raw_record_id = %raw_record_id, "Raw record is already alone.");

			return Ok(UnlinkResponse {
				raw_record_id,
				contact_ids: vec![raw.logical_contact_id],
				links_removed: 0,
			});
		}

		let mut batch = vec![Mutation::DeleteAggregationLinksFor { raw_record_id }];

		if self.cfg.aggregation.pin_unlinked_apart {
			batch.extend(peers.iter().filter_map(|peer| {
				AggregationLink::new(raw_record_id, *peer, AggregationMode::KeepSeparate)
					.map(|link| Mutation::PutAggregationLink { link })
			}));
		}

		checkpoint(cancel, "submit")?;

		self.store.submit_batch(&batch).await.map_err(Error::rejected)?;

		tracing::info!(
			raw_record_id = %raw_record_id,
			peers = peers.len(),
			links_removed = links.len(),
			"Raw record unlinked."
		);

		let mut contact_ids = Vec::with_capacity(2);

		for id in std::iter::once(raw_record_id).chain(peers.iter().copied()) {
			match self.store.logical_contact_id_of(id).await {
				Ok(Some(contact_id)) if !contact_ids.contains(&contact_id) =>
					contact_ids.push(contact_id),
				Ok(_) => {},
				Err(err) => tracing::warn!(
					error = %err,
					raw_record_id = %id,
					"Failed to read a contact after unlinking."
				),
			}
		}

		Ok(UnlinkResponse { raw_record_id, contact_ids, links_removed: links.len() })
	}

	/// Splits a contact into one contact per raw record.
	pub async fn unlink_contact(
		&self,
		contact_id: LogicalContactId,
	) -> Result<UnlinkContactResponse> {
		self.unlink_contact_with_cancel(contact_id, never_cancel()).await
	}

	pub async fn unlink_contact_with_cancel(
		&self,
		contact_id: LogicalContactId,
		cancel: &CancelFn<'_>,
	) -> Result<UnlinkContactResponse> {
		self.ensure_write()?;

		let contact = self.store.logical_contact(contact_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Contact {contact_id} does not exist.") }
		})?;

		if contact.is_profile {
			return Err(Error::InvalidRequest {
				message: format!("Contact {contact_id} is the profile."),
			});
		}

		let raw_record_ids = self.store.raw_record_ids(&[contact_id]).await?;

		if raw_record_ids.len() < 2 {
			return Err(Error::InsufficientRawRecords { found: raw_record_ids.len() });
		}

		let mut batch: Vec<Mutation> = raw_record_ids
			.iter()
			.map(|raw_record_id| Mutation::DeleteAggregationLinksFor {
				raw_record_id: *raw_record_id,
			})
			.collect();

		if self.cfg.aggregation.pin_unlinked_apart {
			batch.extend(
				aggregation::pairwise_links(&raw_record_ids, AggregationMode::KeepSeparate)
					.into_iter()
					.map(|link| Mutation::PutAggregationLink { link }),
			);
		}

		checkpoint(cancel, "submit")?;

		self.store.submit_batch(&batch).await.map_err(Error::rejected)?;

		tracing::info!(
			contact_id = %contact_id,
			raw_records = raw_record_ids.len(),
			"Contact split into its raw records."
		);

		let mut contact_ids = Vec::with_capacity(raw_record_ids.len());

		for raw_record_id in &raw_record_ids {
			if let Some(id) = self.store.logical_contact_id_of(*raw_record_id).await? {
				contact_ids.push(id);
			}
		}

		Ok(UnlinkContactResponse { raw_record_ids, contact_ids })
	}

	/// Unlinks each record in its own batch. A failed record is reported and the loop moves
	/// on; records unlinked before a failure or a cancellation stay unlinked.
	pub async fn unlink_many(&self, raw_record_ids: &[RawRecordId]) -> Result<UnlinkManyResponse> {
		self.unlink_many_with_cancel(raw_record_ids, never_cancel()).await
	}

	pub async fn unlink_many_with_cancel(
		&self,
		raw_record_ids: &[RawRecordId],
		cancel: &CancelFn<'_>,
	) -> Result<UnlinkManyResponse> {
		self.ensure_write()?;

		let mut response = UnlinkManyResponse::default();

		for raw_record_id in raw_record_ids {
			if cancel() {
				response.cancelled = true;

				break;
			}

			match self.unlink_with_cancel(*raw_record_id, cancel).await {
				Ok(unlinked) => response.unlinked.push(unlinked),
				Err(Error::Cancelled { .. }) => {
					response.cancelled = true;

					break;
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						raw_record_id = %raw_record_id,
						"Failed to unlink raw record."
					);

					response.failed.push(UnlinkFailure {
						raw_record_id: *raw_record_id,
						code: err.code().to_string(),
						message: err.to_string(),
					});
				},
			}
		}

		Ok(response)
	}
}
