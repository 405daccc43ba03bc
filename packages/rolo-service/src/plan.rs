use serde::{Deserialize, Serialize};

use rolo_domain::{AggregationLink, AggregationMode, LogicalContactId, RawRecordId, aggregation};
use rolo_storage::Mutation;

use crate::{ContactsService, Error, Result};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LinkPlan {
	/// Every raw record of the linked contacts, ascending.
	pub raw_record_ids: Vec<RawRecordId>,
	pub links: Vec<AggregationLink>,
}
impl LinkPlan {
	pub fn mutations(&self) -> Vec<Mutation> {
		self.links.iter().map(|link| Mutation::PutAggregationLink { link: *link }).collect()
	}
}

impl ContactsService {
	/// Plans a `KeepTogether` link for every pair of raw records under `ordered_ids`.
	pub async fn plan_links(&self, ordered_ids: &[LogicalContactId]) -> Result<LinkPlan> {
		let mut raw_record_ids = self.store.raw_record_ids(ordered_ids).await?;

		raw_record_ids.sort();
		raw_record_ids.dedup();

		if raw_record_ids.len() < 2 {
			return Err(Error::InsufficientRawRecords { found: raw_record_ids.len() });
		}

		let ceiling = self.cfg.aggregation.max_link_raw_records as usize;

		if raw_record_ids.len() > ceiling {
			return Err(Error::InvalidRequest {
				message: format!(
					"Linking {} raw records exceeds aggregation.max_link_raw_records ({ceiling}).",
					raw_record_ids.len()
				),
			});
		}

		let links = aggregation::pairwise_links(&raw_record_ids, AggregationMode::KeepTogether);

		tracing::debug!(
			contacts = ordered_ids.len(),
			raw_records = raw_record_ids.len(),
			links = links.len(),
			"Link plan built."
		);

		Ok(LinkPlan { raw_record_ids, links })
	}
}
