//! The record store seam.
//!
//! A store owns raw records, logical contacts, field rows and aggregation links. Reads are
//! individual calls. Writes only happen through [`RecordStore::submit_batch`], which applies a
//! whole batch or nothing and then recomputes contact membership and display names.

use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};

use rolo_domain::{
	Account, AggregationLink, FieldKind, FieldRow, LogicalContact, LogicalContactId, RawRecord,
	RawRecordId, ids::FieldRowId,
};

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFlag {
	Primary,
	SuperPrimary,
}

/// Selects every field row of one kind under a raw record or a logical contact.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RowSelector {
	RawRecord { raw_record_id: RawRecordId, kind: FieldKind },
	LogicalContact { logical_contact_id: LogicalContactId, kind: FieldKind },
}
impl RowSelector {
	pub fn matches(&self, row: &FieldRow) -> bool {
		match *self {
			Self::RawRecord { raw_record_id, kind } =>
				row.raw_record_id == raw_record_id && row.kind() == kind,
			Self::LogicalContact { logical_contact_id, kind } =>
				row.logical_contact_id == logical_contact_id && row.kind() == kind,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
	/// Writes the pair, replacing the mode of an existing row for the same pair.
	PutAggregationLink { link: AggregationLink },
	DeleteAggregationLinksFor { raw_record_id: RawRecordId },
	ClearFlag { selector: RowSelector, flag: FieldFlag },
	SetFlags { field_row_id: FieldRowId, is_primary: Option<bool>, is_super_primary: Option<bool> },
}
impl Mutation {
	pub fn touches_links(&self) -> bool {
		matches!(self, Self::PutAggregationLink { .. } | Self::DeleteAggregationLinksFor { .. })
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BatchReceipt {
	pub mutations: usize,
	pub rows_affected: u64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrder {
	#[default]
	Id,
	/// Super-primary rows first, then newest `last_modified`, then lowest id.
	DefaultThenMostRecent,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldQuery {
	pub raw_record_id: Option<RawRecordId>,
	pub logical_contact_id: Option<LogicalContactId>,
	pub kind: Option<FieldKind>,
	pub order: FieldOrder,
	pub limit: Option<usize>,
}
impl FieldQuery {
	pub fn for_raw_record(raw_record_id: RawRecordId) -> Self {
		Self { raw_record_id: Some(raw_record_id), ..Self::default() }
	}

	pub fn for_contact(logical_contact_id: LogicalContactId) -> Self {
		Self { logical_contact_id: Some(logical_contact_id), ..Self::default() }
	}

	pub fn kind(mut self, kind: FieldKind) -> Self {
		self.kind = Some(kind);

		self
	}

	pub fn order(mut self, order: FieldOrder) -> Self {
		self.order = order;

		self
	}

	pub fn limit(mut self, limit: usize) -> Self {
		self.limit = Some(limit);

		self
	}

	pub fn matches(&self, row: &FieldRow) -> bool {
		self.raw_record_id.is_none_or(|id| row.raw_record_id == id)
			&& self.logical_contact_id.is_none_or(|id| row.logical_contact_id == id)
			&& self.kind.is_none_or(|kind| row.kind() == kind)
	}

	/// Sorts and truncates rows that already passed [`FieldQuery::matches`].
	pub fn finish(&self, mut rows: Vec<FieldRow>) -> Vec<FieldRow> {
		match self.order {
			FieldOrder::Id => rows.sort_by_key(|row| row.id),
			FieldOrder::DefaultThenMostRecent => rows.sort_by(|a, b| {
				b.is_super_primary
					.cmp(&a.is_super_primary)
					.then_with(|| b.last_modified.cmp(&a.last_modified))
					.then_with(|| a.id.cmp(&b.id))
			}),
		}

		if let Some(limit) = self.limit {
			rows.truncate(limit);
		}

		rows
	}
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NewRawRecord {
	pub account: Option<Account>,
	pub is_profile: bool,
}
impl NewRawRecord {
	pub fn in_account(name: impl Into<String>, account_type: impl Into<String>) -> Self {
		Self {
			account: Some(Account { name: name.into(), account_type: account_type.into() }),
			is_profile: false,
		}
	}

	pub fn profile() -> Self {
		Self { account: None, is_profile: true }
	}
}

pub trait RecordStore
where
	Self: Send + Sync,
{
	fn raw_record<'a>(&'a self, id: RawRecordId) -> BoxFuture<'a, Result<Option<RawRecord>>>;

	/// Raw record ids of every listed contact, ascending. Unknown contacts contribute nothing.
	fn raw_record_ids<'a>(
		&'a self,
		contact_ids: &'a [LogicalContactId],
	) -> BoxFuture<'a, Result<Vec<RawRecordId>>>;

	fn logical_contact<'a>(
		&'a self,
		id: LogicalContactId,
	) -> BoxFuture<'a, Result<Option<LogicalContact>>>;

	fn logical_contact_id_of<'a>(
		&'a self,
		raw_record_id: RawRecordId,
	) -> BoxFuture<'a, Result<Option<LogicalContactId>>>;

	fn field_row<'a>(&'a self, id: FieldRowId) -> BoxFuture<'a, Result<Option<FieldRow>>>;

	fn field_rows<'a>(&'a self, query: &'a FieldQuery) -> BoxFuture<'a, Result<Vec<FieldRow>>>;

	fn aggregation_links_for<'a>(
		&'a self,
		raw_record_id: RawRecordId,
	) -> BoxFuture<'a, Result<Vec<AggregationLink>>>;

	fn submit_batch<'a>(&'a self, batch: &'a [Mutation]) -> BoxFuture<'a, Result<BatchReceipt>>;

	fn first_field_row<'a>(
		&'a self,
		query: &'a FieldQuery,
	) -> BoxFuture<'a, Result<Option<FieldRow>>> {
		Box::pin(async move {
			let rows = self.field_rows(query).await?;

			Ok::<_, crate::Error>(rows.into_iter().next())
		})
	}
}
