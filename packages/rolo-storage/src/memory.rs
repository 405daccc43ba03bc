//! In-process record store.
//!
//! Batches are applied to a copy of the state and swapped in only when every mutation
//! succeeded, so a rejected batch leaves nothing behind.

use std::{
	collections::{BTreeMap, BTreeSet},
	future,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;

use rolo_domain::{
	AggregationLink, DisplayNameSource, FieldRow, FieldValue, LogicalContact, LogicalContactId,
	RawRecord, RawRecordId, aggregation, display, field, ids::FieldRowId,
};

use crate::{
	BatchReceipt, BoxFuture, Error, FieldFlag, FieldQuery, Mutation, NewRawRecord, RecordStore,
	Result,
};

#[derive(Clone, Debug, Default)]
struct State {
	raw_records: BTreeMap<RawRecordId, RawRecord>,
	contacts: BTreeMap<LogicalContactId, LogicalContact>,
	field_rows: BTreeMap<FieldRowId, FieldRow>,
	links: BTreeMap<(RawRecordId, RawRecordId), AggregationLink>,
	last_raw_record_id: i64,
	last_contact_id: i64,
	last_field_row_id: i64,
}
impl State {
	fn allocate_contact(&mut self, is_profile: bool) -> LogicalContactId {
		self.last_contact_id += 1;

		let id = LogicalContactId(self.last_contact_id);

		self.contacts.insert(
			id,
			LogicalContact {
				id,
				display_name: None,
				display_name_source: DisplayNameSource::Undefined,
				name_raw_record_id: None,
				is_profile,
			},
		);

		id
	}

	fn members(&self, contact_id: LogicalContactId) -> Vec<RawRecordId> {
		self.raw_records
			.values()
			.filter(|raw| raw.logical_contact_id == contact_id)
			.map(|raw| raw.id)
			.collect()
	}

	fn apply(&mut self, mutation: &Mutation) -> Result<u64> {
		match mutation {
			Mutation::PutAggregationLink { link } => {
				for raw_id in [link.raw_a, link.raw_b] {
					let raw = self.raw_records.get(&raw_id).ok_or_else(|| {
						Error::Rejected(format!("Raw record {raw_id} does not exist."))
					})?;

					if raw.is_profile {
						return Err(Error::Rejected(format!(
							"Raw record {raw_id} belongs to the profile and cannot be linked."
						)));
					}
				}

				self.links.insert(link.pair(), *link);

				Ok(1)
			},
			Mutation::DeleteAggregationLinksFor { raw_record_id } => {
				let before = self.links.len();

				self.links.retain(|_, link| !link.touches(*raw_record_id));

				Ok((before - self.links.len()) as u64)
			},
			Mutation::ClearFlag { selector, flag } => {
				let mut changed = 0;

				for row in self.field_rows.values_mut().filter(|row| selector.matches(row)) {
					let slot = match flag {
						FieldFlag::Primary => &mut row.is_primary,
						FieldFlag::SuperPrimary => &mut row.is_super_primary,
					};

					if *slot {
						*slot = false;
						changed += 1;
					}
				}

				Ok(changed)
			},
			Mutation::SetFlags { field_row_id, is_primary, is_super_primary } => {
				let row = self.field_rows.get_mut(field_row_id).ok_or_else(|| {
					Error::Rejected(format!("Field row {field_row_id} does not exist."))
				})?;

				if let Some(value) = is_primary {
					row.is_primary = *value;
				}
				if let Some(value) = is_super_primary {
					row.is_super_primary = *value;
				}

				Ok(1)
			},
		}
	}

	fn regroup(&mut self) {
		let prior: BTreeMap<RawRecordId, LogicalContactId> =
			self.raw_records.values().map(|raw| (raw.id, raw.logical_contact_id)).collect();
		let links: Vec<AggregationLink> = self.links.values().copied().collect();
		let regrouping = aggregation::regroup(&prior, &links);
		let pins: Vec<RawRecordId> =
			self.contacts.values().filter_map(|contact| contact.name_raw_record_id).collect();

		for group in regrouping.groups {
			let is_profile = group
				.members
				.iter()
				.any(|raw| self.raw_records.get(raw).is_some_and(|raw| raw.is_profile));
			let contact_id = match group.contact_id {
				Some(id) => id,
				None => self.allocate_contact(is_profile),
			};
			let pinned = pins.iter().copied().filter(|raw| group.members.contains(raw)).min();

			if let Some(contact) = self.contacts.get_mut(&contact_id) {
				contact.name_raw_record_id = pinned;
			}

			for raw_id in &group.members {
				if let Some(raw) = self.raw_records.get_mut(raw_id) {
					raw.logical_contact_id = contact_id;
				}
			}
		}

		for retired in regrouping.retired {
			self.contacts.remove(&retired);
		}

		for row in self.field_rows.values_mut() {
			if let Some(raw) = self.raw_records.get(&row.raw_record_id) {
				row.logical_contact_id = raw.logical_contact_id;
			}
		}

		let rows: Vec<FieldRow> = self.field_rows.values().cloned().collect();

		for id in field::conflicting_defaults(&rows) {
			if let Some(row) = self.field_rows.get_mut(&id) {
				row.is_super_primary = false;
			}
		}
	}

	fn refresh_display_names(&mut self) {
		let ids: Vec<LogicalContactId> = self.contacts.keys().copied().collect();

		for id in ids {
			self.refresh_display_name(id);
		}
	}

	fn refresh_display_name(&mut self, contact_id: LogicalContactId) {
		let rows: Vec<FieldRow> = self
			.field_rows
			.values()
			.filter(|row| row.logical_contact_id == contact_id)
			.cloned()
			.collect();
		let members = self.members(contact_id);
		let Some(contact) = self.contacts.get_mut(&contact_id) else {
			return;
		};
		let pinned = contact.name_raw_record_id.filter(|raw| members.contains(raw));
		let chosen = display::choose_display_name(&rows, pinned);

		contact.display_name = chosen.text;
		contact.display_name_source = chosen.source;
		contact.name_raw_record_id = chosen.name_raw_record_id;
	}
}

#[derive(Debug, Default)]
struct Inner {
	state: State,
	reject_next: Option<String>,
	batches_submitted: usize,
}

/// Mutex-guarded in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
	inner: Mutex<Inner>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a raw record into a fresh logical contact of its own.
	pub fn insert_raw_record(&self, record: NewRawRecord) -> RawRecord {
		let mut inner = self.lock();
		let state = &mut inner.state;
		let contact_id = state.allocate_contact(record.is_profile);

		state.last_raw_record_id += 1;

		let raw = RawRecord {
			id: RawRecordId(state.last_raw_record_id),
			logical_contact_id: contact_id,
			account: record.account,
			is_profile: record.is_profile,
		};

		state.raw_records.insert(raw.id, raw.clone());

		raw
	}

	pub fn insert_field_row(
		&self,
		raw_record_id: RawRecordId,
		value: FieldValue,
		last_modified: OffsetDateTime,
	) -> Result<FieldRow> {
		let mut inner = self.lock();
		let state = &mut inner.state;
		let contact_id = state
			.raw_records
			.get(&raw_record_id)
			.map(|raw| raw.logical_contact_id)
			.ok_or_else(|| Error::NotFound(format!("Raw record {raw_record_id} does not exist.")))?;

		state.last_field_row_id += 1;

		let row = FieldRow {
			id: FieldRowId(state.last_field_row_id),
			raw_record_id,
			logical_contact_id: contact_id,
			value,
			is_primary: false,
			is_super_primary: false,
			last_modified,
		};

		state.field_rows.insert(row.id, row.clone());
		state.refresh_display_name(contact_id);

		Ok(row)
	}

	/// Records `raw_record_id` as the contact's name source, as a sync adapter would after
	/// the user picked a name on the device.
	pub fn pin_name_source(
		&self,
		contact_id: LogicalContactId,
		raw_record_id: RawRecordId,
	) -> Result<()> {
		let mut inner = self.lock();
		let state = &mut inner.state;

		if !state.members(contact_id).contains(&raw_record_id) {
			return Err(Error::InvalidArgument(format!(
				"Raw record {raw_record_id} is not a member of contact {contact_id}."
			)));
		}
		if let Some(contact) = state.contacts.get_mut(&contact_id) {
			contact.name_raw_record_id = Some(raw_record_id);
		}

		state.refresh_display_name(contact_id);

		Ok(())
	}

	/// Makes the next `submit_batch` fail with [`Error::Rejected`].
	pub fn reject_next_batch(&self, reason: impl Into<String>) {
		self.lock().reject_next = Some(reason.into());
	}

	/// Count of `submit_batch` calls, rejected ones included.
	pub fn batches_submitted(&self) -> usize {
		self.lock().batches_submitted
	}

	pub fn links(&self) -> Vec<AggregationLink> {
		self.lock().state.links.values().copied().collect()
	}

	pub fn contact_of(&self, raw_record_id: RawRecordId) -> Option<LogicalContactId> {
		self.lock().state.raw_records.get(&raw_record_id).map(|raw| raw.logical_contact_id)
	}

	pub fn members(&self, contact_id: LogicalContactId) -> Vec<RawRecordId> {
		self.lock().state.members(contact_id)
	}

	pub fn contact_ids(&self) -> Vec<LogicalContactId> {
		self.lock().state.contacts.keys().copied().collect()
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn read<T, F>(&self, f: F) -> BoxFuture<'_, Result<T>>
	where
		T: Send + 'static,
		F: FnOnce(&State) -> T,
	{
		let value = f(&self.lock().state);

		Box::pin(future::ready(Ok(value)))
	}

	fn commit(&self, batch: &[Mutation]) -> Result<BatchReceipt> {
		let mut inner = self.lock();

		inner.batches_submitted += 1;

		if let Some(reason) = inner.reject_next.take() {
			tracing::warn!(reason = %reason, mutations = batch.len(), "Batch rejected by store.");

			return Err(Error::Rejected(reason));
		}

		let mut next = inner.state.clone();
		let mut rows_affected = 0;

		for mutation in batch {
			rows_affected += next.apply(mutation)?;
		}

		if batch.iter().any(Mutation::touches_links) {
			next.regroup();
		}

		next.refresh_display_names();

		inner.state = next;

		tracing::debug!(mutations = batch.len(), rows_affected, "Batch committed.");

		Ok(BatchReceipt { mutations: batch.len(), rows_affected })
	}
}
impl RecordStore for MemoryStore {
	fn raw_record<'a>(&'a self, id: RawRecordId) -> BoxFuture<'a, Result<Option<RawRecord>>> {
		self.read(|state| state.raw_records.get(&id).cloned())
	}

	fn raw_record_ids<'a>(
		&'a self,
		contact_ids: &'a [LogicalContactId],
	) -> BoxFuture<'a, Result<Vec<RawRecordId>>> {
		self.read(|state| {
			let wanted: BTreeSet<LogicalContactId> = contact_ids.iter().copied().collect();

			state
				.raw_records
				.values()
				.filter(|raw| wanted.contains(&raw.logical_contact_id))
				.map(|raw| raw.id)
				.collect()
		})
	}

	fn logical_contact<'a>(
		&'a self,
		id: LogicalContactId,
	) -> BoxFuture<'a, Result<Option<LogicalContact>>> {
		self.read(|state| state.contacts.get(&id).cloned())
	}

	fn logical_contact_id_of<'a>(
		&'a self,
		raw_record_id: RawRecordId,
	) -> BoxFuture<'a, Result<Option<LogicalContactId>>> {
		self.read(|state| state.raw_records.get(&raw_record_id).map(|raw| raw.logical_contact_id))
	}

	fn field_row<'a>(&'a self, id: FieldRowId) -> BoxFuture<'a, Result<Option<FieldRow>>> {
		self.read(|state| state.field_rows.get(&id).cloned())
	}

	fn field_rows<'a>(&'a self, query: &'a FieldQuery) -> BoxFuture<'a, Result<Vec<FieldRow>>> {
		self.read(|state| {
			let rows =
				state.field_rows.values().filter(|row| query.matches(row)).cloned().collect();

			query.finish(rows)
		})
	}

	fn aggregation_links_for<'a>(
		&'a self,
		raw_record_id: RawRecordId,
	) -> BoxFuture<'a, Result<Vec<AggregationLink>>> {
		self.read(|state| {
			state.links.values().filter(|link| link.touches(raw_record_id)).copied().collect()
		})
	}

	fn submit_batch<'a>(&'a self, batch: &'a [Mutation]) -> BoxFuture<'a, Result<BatchReceipt>> {
		let result = self.commit(batch);

		Box::pin(future::ready(result))
	}
}
