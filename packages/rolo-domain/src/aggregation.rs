//! Pure aggregation rules shared by every record store.
//!
//! Membership of logical contacts is the set of connected components of `KeepTogether`
//! links. `KeepSeparate` rows only pin a pair apart so a later relink is explicit.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{LogicalContactId, RawRecordId};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
	KeepTogether,
	KeepSeparate,
}
impl AggregationMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::KeepTogether => "keep_together",
			Self::KeepSeparate => "keep_separate",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"keep_together" => Some(Self::KeepTogether),
			"keep_separate" => Some(Self::KeepSeparate),
			_ => None,
		}
	}
}

/// An unordered pair of raw records, stored with `raw_a < raw_b`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AggregationLink {
	pub raw_a: RawRecordId,
	pub raw_b: RawRecordId,
	pub mode: AggregationMode,
}
impl AggregationLink {
	pub fn new(a: RawRecordId, b: RawRecordId, mode: AggregationMode) -> Option<Self> {
		match a.cmp(&b) {
			std::cmp::Ordering::Less => Some(Self { raw_a: a, raw_b: b, mode }),
			std::cmp::Ordering::Greater => Some(Self { raw_a: b, raw_b: a, mode }),
			std::cmp::Ordering::Equal => None,
		}
	}

	pub fn touches(&self, raw: RawRecordId) -> bool {
		self.raw_a == raw || self.raw_b == raw
	}

	pub fn other(&self, raw: RawRecordId) -> Option<RawRecordId> {
		if self.raw_a == raw {
			Some(self.raw_b)
		} else if self.raw_b == raw {
			Some(self.raw_a)
		} else {
			None
		}
	}

	pub fn pair(&self) -> (RawRecordId, RawRecordId) {
		(self.raw_a, self.raw_b)
	}
}

/// One directive per pair `(raw[i], raw[j])` with `i < j`.
pub fn pairwise_links(raw_ids: &[RawRecordId], mode: AggregationMode) -> Vec<AggregationLink> {
	let mut links = Vec::with_capacity(raw_ids.len() * raw_ids.len().saturating_sub(1) / 2);

	for (i, a) in raw_ids.iter().enumerate() {
		for b in &raw_ids[i + 1..] {
			if let Some(link) = AggregationLink::new(*a, *b, mode) {
				links.push(link);
			}
		}
	}

	links
}

/// Primary first, then the remaining valid ids deduplicated and ascending.
pub fn order_candidates(
	primary: LogicalContactId,
	others: &[LogicalContactId],
) -> Vec<LogicalContactId> {
	let rest: BTreeSet<LogicalContactId> =
		others.iter().copied().filter(|id| id.is_valid() && *id != primary).collect();
	let mut ordered = Vec::with_capacity(rest.len() + 1);

	if primary.is_valid() {
		ordered.push(primary);
	}

	ordered.extend(rest);

	ordered
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
	/// Ascending.
	pub members: Vec<RawRecordId>,
	/// `None` when the group needs a freshly allocated contact.
	pub contact_id: Option<LogicalContactId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Regrouping {
	pub groups: Vec<Group>,
	/// Prior contact ids no group kept.
	pub retired: Vec<LogicalContactId>,
}

/// Recomputes membership for the raw records in `prior` from `links`.
///
/// Groups are visited largest first, ties by lowest member. Each group keeps the prior
/// contact id most of its members carried, ties to the smallest id, skipping ids an earlier
/// group already kept. Links naming records outside `prior` are ignored.
pub fn regroup(
	prior: &BTreeMap<RawRecordId, LogicalContactId>,
	links: &[AggregationLink],
) -> Regrouping {
	let members: Vec<RawRecordId> = prior.keys().copied().collect();
	let index: BTreeMap<RawRecordId, usize> =
		members.iter().enumerate().map(|(i, raw)| (*raw, i)).collect();
	let mut set = DisjointSet::new(members.len());

	for link in links.iter().filter(|link| link.mode == AggregationMode::KeepTogether) {
		if let (Some(a), Some(b)) = (index.get(&link.raw_a), index.get(&link.raw_b)) {
			set.union(*a, *b);
		}
	}

	let mut components: BTreeMap<usize, Vec<RawRecordId>> = BTreeMap::new();

	for (i, raw) in members.iter().enumerate() {
		components.entry(set.find(i)).or_default().push(*raw);
	}

	let mut components: Vec<Vec<RawRecordId>> = components.into_values().collect();

	components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

	let mut claimed = BTreeSet::new();
	let mut groups = Vec::with_capacity(components.len());

	for members in components {
		let mut counts: BTreeMap<LogicalContactId, usize> = BTreeMap::new();

		for raw in &members {
			if let Some(contact) = prior.get(raw).filter(|id| id.is_valid()) {
				*counts.entry(*contact).or_default() += 1;
			}
		}

		let mut candidates: Vec<(LogicalContactId, usize)> = counts.into_iter().collect();

		candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

		let contact_id =
			candidates.into_iter().map(|(id, _)| id).find(|id| !claimed.contains(id));

		if let Some(id) = contact_id {
			claimed.insert(id);
		}

		groups.push(Group { members, contact_id });
	}

	let retired = prior
		.values()
		.copied()
		.filter(|id| id.is_valid() && !claimed.contains(id))
		.collect::<BTreeSet<_>>()
		.into_iter()
		.collect();

	Regrouping { groups, retired }
}

struct DisjointSet {
	parent: Vec<usize>,
	rank: Vec<u8>,
}
impl DisjointSet {
	fn new(len: usize) -> Self {
		Self { parent: (0..len).collect(), rank: vec![0; len] }
	}

	fn find(&mut self, node: usize) -> usize {
		let mut root = node;

		while self.parent[root] != root {
			root = self.parent[root];
		}

		let mut cursor = node;

		while self.parent[cursor] != root {
			let next = self.parent[cursor];

			self.parent[cursor] = root;
			cursor = next;
		}

		root
	}

	fn union(&mut self, a: usize, b: usize) {
		let (ra, rb) = (self.find(a), self.find(b));

		if ra == rb {
			return;
		}

		match self.rank[ra].cmp(&self.rank[rb]) {
			std::cmp::Ordering::Less => self.parent[ra] = rb,
			std::cmp::Ordering::Greater => self.parent[rb] = ra,
			std::cmp::Ordering::Equal => {
				self.parent[rb] = ra;
				self.rank[ra] = self.rank[ra].saturating_add(1);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use crate::{
		aggregation::{AggregationLink, AggregationMode, pairwise_links, regroup},
		ids::{LogicalContactId, RawRecordId},
	};

	fn raw(ids: &[i64]) -> Vec<RawRecordId> {
		ids.iter().copied().map(RawRecordId).collect()
	}

	#[test]
	fn links_normalize_their_pair() {
		let link =
			AggregationLink::new(RawRecordId(9), RawRecordId(4), AggregationMode::KeepTogether)
				.expect("Distinct records must form a link.");

		assert_eq!(link.pair(), (RawRecordId(4), RawRecordId(9)));
		assert_eq!(link.other(RawRecordId(9)), Some(RawRecordId(4)));
		assert!(
			AggregationLink::new(RawRecordId(4), RawRecordId(4), AggregationMode::KeepTogether)
				.is_none()
		);
	}

	#[test]
	fn pairwise_links_cover_every_pair_once() {
		let links = pairwise_links(&raw(&[1, 2, 3, 4]), AggregationMode::KeepTogether);

		assert_eq!(links.len(), 6);
		assert!(links.iter().all(|link| link.raw_a < link.raw_b));
		assert!(pairwise_links(&raw(&[1]), AggregationMode::KeepTogether).is_empty());
	}

	#[test]
	fn separate_links_do_not_join_components() {
		let prior: BTreeMap<_, _> =
			[(RawRecordId(1), LogicalContactId(1)), (RawRecordId(2), LogicalContactId(2))].into();
		let link =
			AggregationLink::new(RawRecordId(1), RawRecordId(2), AggregationMode::KeepSeparate)
				.expect("Distinct records must form a link.");
		let links = [link];
		let regrouping = regroup(&prior, &links);

		assert_eq!(regrouping.groups.len(), 2);
		assert!(regrouping.retired.is_empty());
	}
}
