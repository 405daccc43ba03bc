use std::collections::{BTreeMap, BTreeSet};

use sqlx::{PgConnection, PgPool, postgres::PgPoolOptions};
use time::OffsetDateTime;

use rolo_domain::{
	AggregationLink, AggregationMode, FieldRow, FieldValue, LogicalContact, LogicalContactId,
	RawRecord, RawRecordId, aggregation, display, field, ids::FieldRowId,
};

use crate::{
	BatchReceipt, BoxFuture, Error, FieldFlag, FieldQuery, Mutation, NewRawRecord, RecordStore,
	Result, RowSelector, queries, schema,
};

const SCHEMA_LOCK_ID: i64 = 7_120_201;
const AGGREGATION_LOCK_ID: i64 = 7_120_202;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &rolo_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		// The advisory lock lives as long as the transaction, on the transaction's connection.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	/// Inserts a raw record into a fresh logical contact of its own.
	pub async fn insert_raw_record(&self, record: NewRawRecord) -> Result<RawRecord> {
		let mut tx = self.pool.begin().await?;
		let contact_id = queries::insert_logical_contact(&mut tx, record.is_profile).await?;
		let (account_name, account_type) = match record.account.as_ref() {
			Some(account) => (Some(account.name.as_str()), Some(account.account_type.as_str())),
			None => (None, None),
		};
		let row = queries::insert_raw_record(
			&mut tx,
			contact_id,
			account_name,
			account_type,
			record.is_profile,
		)
		.await?;

		tx.commit().await?;

		Ok(row.into_domain())
	}

	pub async fn insert_field_row(
		&self,
		raw_record_id: RawRecordId,
		value: FieldValue,
		last_modified: OffsetDateTime,
	) -> Result<FieldRow> {
		let mut tx = self.pool.begin().await?;
		let raw = queries::select_raw_record(&mut tx, raw_record_id.get())
			.await?
			.ok_or_else(|| Error::NotFound(format!("Raw record {raw_record_id} does not exist.")))?;
		let json = serde_json::to_value(&value)?;
		let id =
			queries::insert_field_row(&mut tx, raw.id, value.kind(), &json, last_modified).await?;

		refresh_display_name(&mut tx, raw.logical_contact_id).await?;

		tx.commit().await?;

		Ok(FieldRow {
			id: FieldRowId(id),
			raw_record_id,
			logical_contact_id: LogicalContactId(raw.logical_contact_id),
			value,
			is_primary: false,
			is_super_primary: false,
			last_modified,
		})
	}

	pub async fn pin_name_source(
		&self,
		contact_id: LogicalContactId,
		raw_record_id: RawRecordId,
	) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let raw = queries::select_raw_record(&mut tx, raw_record_id.get()).await?;

		if raw.as_ref().map(|raw| raw.logical_contact_id) != Some(contact_id.get()) {
			return Err(Error::InvalidArgument(format!(
				"Raw record {raw_record_id} is not a member of contact {contact_id}."
			)));
		}

		queries::set_name_raw_record(&mut tx, contact_id.get(), Some(raw_record_id.get())).await?;
		refresh_display_name(&mut tx, contact_id.get()).await?;

		tx.commit().await?;

		Ok(())
	}

	async fn load_raw_record(&self, id: RawRecordId) -> Result<Option<RawRecord>> {
		let mut conn = self.pool.acquire().await?;
		let row = queries::select_raw_record(&mut conn, id.get()).await?;

		Ok(row.map(|row| row.into_domain()))
	}

	async fn load_raw_record_ids(
		&self,
		contact_ids: &[LogicalContactId],
	) -> Result<Vec<RawRecordId>> {
		let ids: Vec<i64> = contact_ids.iter().map(|id| id.get()).collect();
		let mut conn = self.pool.acquire().await?;
		let rows = queries::select_raw_records_of_contacts(&mut conn, &ids).await?;

		Ok(rows.into_iter().map(|row| RawRecordId(row.id)).collect())
	}

	async fn load_logical_contact(&self, id: LogicalContactId) -> Result<Option<LogicalContact>> {
		let mut conn = self.pool.acquire().await?;
		let row = queries::select_logical_contact(&mut conn, id.get()).await?;

		row.map(|row| row.into_domain()).transpose()
	}

	async fn load_logical_contact_id_of(
		&self,
		raw_record_id: RawRecordId,
	) -> Result<Option<LogicalContactId>> {
		let mut conn = self.pool.acquire().await?;
		let row = queries::select_raw_record(&mut conn, raw_record_id.get()).await?;

		Ok(row.map(|row| LogicalContactId(row.logical_contact_id)))
	}

	async fn load_field_row(&self, id: FieldRowId) -> Result<Option<FieldRow>> {
		let mut conn = self.pool.acquire().await?;
		let row = queries::select_field_row(&mut conn, id.get()).await?;

		row.map(|row| row.into_domain()).transpose()
	}

	async fn load_field_rows(&self, query: &FieldQuery) -> Result<Vec<FieldRow>> {
		let mut conn = self.pool.acquire().await?;
		let rows = queries::select_field_rows(&mut conn, query).await?;

		rows.into_iter().map(|row| row.into_domain()).collect()
	}

	async fn load_links_for(&self, raw_record_id: RawRecordId) -> Result<Vec<AggregationLink>> {
		let mut conn = self.pool.acquire().await?;
		let rows = queries::select_links_touching(&mut conn, &[raw_record_id.get()]).await?;

		rows.into_iter().map(|row| row.into_domain()).collect()
	}

	async fn commit_logged(&self, batch: &[Mutation]) -> Result<BatchReceipt> {
		self.commit(batch).await.inspect_err(|err| {
			tracing::warn!(error = %err, mutations = batch.len(), "Batch rolled back.");
		})
	}

	async fn commit(&self, batch: &[Mutation]) -> Result<BatchReceipt> {
		let mut tx = self.pool.begin().await?;
		let relinks = batch.iter().any(Mutation::touches_links);

		if relinks {
			sqlx::query("SELECT pg_advisory_xact_lock($1)")
				.bind(AGGREGATION_LOCK_ID)
				.execute(&mut *tx)
				.await?;
		}

		let mut rows_affected = 0;
		let mut touched_raws = BTreeSet::new();
		let mut touched_contacts = BTreeSet::new();

		for mutation in batch {
			rows_affected +=
				apply(&mut tx, mutation, &mut touched_raws, &mut touched_contacts).await?;
		}

		if relinks {
			touched_contacts.extend(regroup(&mut tx, &touched_raws).await?);
		}

		let raw_ids: Vec<i64> = touched_raws.iter().copied().collect();

		for raw in queries::select_raw_records_by_ids(&mut tx, &raw_ids).await? {
			touched_contacts.insert(raw.logical_contact_id);
		}
		for contact_id in &touched_contacts {
			refresh_display_name(&mut tx, *contact_id).await?;
		}

		tx.commit().await?;

		tracing::debug!(
			mutations = batch.len(),
			rows_affected,
			contacts = touched_contacts.len(),
			"Batch committed."
		);

		Ok(BatchReceipt { mutations: batch.len(), rows_affected })
	}
}
impl RecordStore for Db {
	fn raw_record<'a>(&'a self, id: RawRecordId) -> BoxFuture<'a, Result<Option<RawRecord>>> {
		Box::pin(self.load_raw_record(id))
	}

	fn raw_record_ids<'a>(
		&'a self,
		contact_ids: &'a [LogicalContactId],
	) -> BoxFuture<'a, Result<Vec<RawRecordId>>> {
		Box::pin(self.load_raw_record_ids(contact_ids))
	}

	fn logical_contact<'a>(
		&'a self,
		id: LogicalContactId,
	) -> BoxFuture<'a, Result<Option<LogicalContact>>> {
		Box::pin(self.load_logical_contact(id))
	}

	fn logical_contact_id_of<'a>(
		&'a self,
		raw_record_id: RawRecordId,
	) -> BoxFuture<'a, Result<Option<LogicalContactId>>> {
		Box::pin(self.load_logical_contact_id_of(raw_record_id))
	}

	fn field_row<'a>(&'a self, id: FieldRowId) -> BoxFuture<'a, Result<Option<FieldRow>>> {
		Box::pin(self.load_field_row(id))
	}

	fn field_rows<'a>(&'a self, query: &'a FieldQuery) -> BoxFuture<'a, Result<Vec<FieldRow>>> {
		Box::pin(self.load_field_rows(query))
	}

	fn aggregation_links_for<'a>(
		&'a self,
		raw_record_id: RawRecordId,
	) -> BoxFuture<'a, Result<Vec<AggregationLink>>> {
		Box::pin(self.load_links_for(raw_record_id))
	}

	fn submit_batch<'a>(&'a self, batch: &'a [Mutation]) -> BoxFuture<'a, Result<BatchReceipt>> {
		Box::pin(self.commit_logged(batch))
	}
}

async fn apply(
	conn: &mut PgConnection,
	mutation: &Mutation,
	touched_raws: &mut BTreeSet<i64>,
	touched_contacts: &mut BTreeSet<i64>,
) -> Result<u64> {
	match mutation {
		Mutation::PutAggregationLink { link } => {
			let ids = [link.raw_a.get(), link.raw_b.get()];
			let rows = queries::select_raw_records_by_ids(&mut *conn, &ids).await?;

			if rows.len() != ids.len() {
				return Err(Error::Rejected(format!(
					"Link {} <-> {} names a raw record that does not exist.",
					link.raw_a, link.raw_b
				)));
			}
			if let Some(profile) = rows.iter().find(|row| row.is_profile) {
				return Err(Error::Rejected(format!(
					"Raw record {} belongs to the profile and cannot be linked.",
					profile.id
				)));
			}

			touched_raws.extend(ids);

			queries::upsert_link(conn, link).await
		},
		Mutation::DeleteAggregationLinksFor { raw_record_id } => {
			touched_raws.insert(raw_record_id.get());

			let links = queries::select_links_touching(&mut *conn, &[raw_record_id.get()]).await?;

			for link in &links {
				touched_raws.insert(link.raw_a);
				touched_raws.insert(link.raw_b);
			}

			queries::delete_links_for(conn, raw_record_id.get()).await
		},
		Mutation::ClearFlag { selector, flag } => {
			let super_primary = matches!(flag, FieldFlag::SuperPrimary);

			match *selector {
				RowSelector::RawRecord { raw_record_id, kind } => {
					touched_raws.insert(raw_record_id.get());

					queries::clear_primary_for_raw_record(
						conn,
						raw_record_id.get(),
						kind,
						super_primary,
					)
					.await
				},
				RowSelector::LogicalContact { logical_contact_id, kind } => {
					touched_contacts.insert(logical_contact_id.get());

					queries::clear_primary_for_contact(
						conn,
						logical_contact_id.get(),
						kind,
						super_primary,
					)
					.await
				},
			}
		},
		Mutation::SetFlags { field_row_id, is_primary, is_super_primary } => {
			let row = queries::select_field_row(&mut *conn, field_row_id.get()).await?.ok_or_else(
				|| Error::Rejected(format!("Field row {field_row_id} does not exist.")),
			)?;

			touched_raws.insert(row.raw_record_id);

			queries::set_field_flags(conn, field_row_id.get(), *is_primary, *is_super_primary).await
		},
	}
}

/// Recomputes membership for every raw record whose contact can change because of `seeds`.
///
/// Returns the contacts that exist after the regroup and hold affected records.
async fn regroup(conn: &mut PgConnection, seeds: &BTreeSet<i64>) -> Result<BTreeSet<i64>> {
	let mut closure: BTreeSet<i64> = seeds.clone();
	let mut contacts: BTreeSet<i64> = BTreeSet::new();
	let mut links: Vec<AggregationLink>;

	loop {
		let raw_ids: Vec<i64> = closure.iter().copied().collect();
		let owners: BTreeSet<i64> = queries::select_raw_records_by_ids(&mut *conn, &raw_ids)
			.await?
			.into_iter()
			.map(|row| row.logical_contact_id)
			.collect();

		contacts.extend(owners);

		let contact_ids: Vec<i64> = contacts.iter().copied().collect();
		let mut grown = closure.clone();

		for row in queries::select_raw_records_of_contacts(&mut *conn, &contact_ids).await? {
			grown.insert(row.id);
		}

		let grown_ids: Vec<i64> = grown.iter().copied().collect();

		links = queries::select_links_touching(&mut *conn, &grown_ids)
			.await?
			.into_iter()
			.map(|row| row.into_domain())
			.collect::<Result<_>>()?;

		for link in links.iter().filter(|link| link.mode == AggregationMode::KeepTogether) {
			grown.insert(link.raw_a.get());
			grown.insert(link.raw_b.get());
		}

		if grown == closure {
			break;
		}

		closure = grown;
	}

	let raw_ids: Vec<i64> = closure.iter().copied().collect();
	let raws = queries::select_raw_records_by_ids(&mut *conn, &raw_ids).await?;
	let prior: BTreeMap<RawRecordId, LogicalContactId> = raws
		.iter()
		.map(|row| (RawRecordId(row.id), LogicalContactId(row.logical_contact_id)))
		.collect();
	let profiles: BTreeSet<i64> =
		raws.iter().filter(|row| row.is_profile).map(|row| row.id).collect();
	let contact_ids: Vec<i64> = contacts.iter().copied().collect();
	let pins: Vec<i64> = queries::select_logical_contacts(&mut *conn, &contact_ids)
		.await?
		.into_iter()
		.filter_map(|row| row.name_raw_record_id)
		.collect();
	let regrouping = aggregation::regroup(&prior, &links);
	let mut survivors = BTreeSet::new();

	for group in regrouping.groups {
		let members: Vec<i64> = group.members.iter().map(|id| id.get()).collect();
		let contact_id = match group.contact_id {
			Some(id) => id.get(),
			None => {
				let is_profile = members.iter().any(|id| profiles.contains(id));

				queries::insert_logical_contact(&mut *conn, is_profile).await?
			},
		};
		let pinned = pins.iter().copied().filter(|raw| members.contains(raw)).min();

		queries::move_raw_records(&mut *conn, &members, contact_id).await?;
		queries::set_name_raw_record(&mut *conn, contact_id, pinned).await?;

		survivors.insert(contact_id);
	}

	let retired: Vec<i64> = regrouping.retired.iter().map(|id| id.get()).collect();

	if !retired.is_empty() {
		queries::delete_logical_contacts(&mut *conn, &retired).await?;
	}

	demote_conflicting_defaults(conn, &survivors).await?;

	tracing::debug!(
		raw_records = prior.len(),
		contacts = survivors.len(),
		retired = retired.len(),
		"Contacts regrouped."
	);

	Ok(survivors)
}

async fn demote_conflicting_defaults(
	conn: &mut PgConnection,
	contact_ids: &BTreeSet<i64>,
) -> Result<()> {
	let mut rows = Vec::new();

	for contact_id in contact_ids {
		let query = FieldQuery::for_contact(LogicalContactId(*contact_id));

		for row in queries::select_field_rows(&mut *conn, &query).await? {
			if row.is_super_primary {
				rows.push(row.into_domain()?);
			}
		}
	}

	let conflicting: Vec<i64> =
		field::conflicting_defaults(&rows).into_iter().map(|id| id.get()).collect();

	if !conflicting.is_empty() {
		queries::demote_super_primary(conn, &conflicting).await?;
	}

	Ok(())
}

async fn refresh_display_name(conn: &mut PgConnection, contact_id: i64) -> Result<()> {
	let Some(contact) = queries::select_logical_contact(&mut *conn, contact_id).await? else {
		return Ok(());
	};
	let members: Vec<i64> = queries::select_raw_records_of_contacts(&mut *conn, &[contact_id])
		.await?
		.into_iter()
		.map(|row| row.id)
		.collect();
	let rows = queries::select_field_rows(
		&mut *conn,
		&FieldQuery::for_contact(LogicalContactId(contact_id)),
	)
	.await?
	.into_iter()
	.map(|row| row.into_domain())
	.collect::<Result<Vec<_>>>()?;
	let pinned =
		contact.name_raw_record_id.filter(|raw| members.contains(raw)).map(RawRecordId);
	let chosen = display::choose_display_name(&rows, pinned);

	queries::update_display_name(conn, contact_id, &chosen).await
}
