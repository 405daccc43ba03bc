use serde_json::Value;
use sqlx::PgConnection;
use time::OffsetDateTime;

use rolo_domain::{AggregationLink, DisplayName, FieldKind};

use crate::{
	FieldOrder, FieldQuery, Result,
	models::{AggregationLinkRow, FieldRowRecord, LogicalContactRow, RawRecordRow},
};

const FIELD_ROW_COLUMNS: &str = "\
SELECT
	f.id,
	f.raw_record_id,
	r.logical_contact_id,
	f.mime_type,
	f.value,
	f.is_primary,
	f.is_super_primary,
	f.last_modified
FROM field_rows f
JOIN raw_records r ON r.id = f.raw_record_id";

pub async fn select_raw_record(conn: &mut PgConnection, id: i64) -> Result<Option<RawRecordRow>> {
	let row = sqlx::query_as(
		"\
SELECT id, logical_contact_id, account_name, account_type, is_profile
FROM raw_records
WHERE id = $1",
	)
	.bind(id)
	.fetch_optional(conn)
	.await?;

	Ok(row)
}

pub async fn select_raw_records_of_contacts(
	conn: &mut PgConnection,
	contact_ids: &[i64],
) -> Result<Vec<RawRecordRow>> {
	let rows = sqlx::query_as(
		"\
SELECT id, logical_contact_id, account_name, account_type, is_profile
FROM raw_records
WHERE logical_contact_id = ANY($1)
ORDER BY id",
	)
	.bind(contact_ids)
	.fetch_all(conn)
	.await?;

	Ok(rows)
}

pub async fn select_raw_records_by_ids(
	conn: &mut PgConnection,
	ids: &[i64],
) -> Result<Vec<RawRecordRow>> {
	let rows = sqlx::query_as(
		"\
SELECT id, logical_contact_id, account_name, account_type, is_profile
FROM raw_records
WHERE id = ANY($1)
ORDER BY id",
	)
	.bind(ids)
	.fetch_all(conn)
	.await?;

	Ok(rows)
}

pub async fn insert_raw_record(
	conn: &mut PgConnection,
	logical_contact_id: i64,
	account_name: Option<&str>,
	account_type: Option<&str>,
	is_profile: bool,
) -> Result<RawRecordRow> {
	let row = sqlx::query_as(
		"\
INSERT INTO raw_records (logical_contact_id, account_name, account_type, is_profile)
VALUES ($1, $2, $3, $4)
RETURNING id, logical_contact_id, account_name, account_type, is_profile",
	)
	.bind(logical_contact_id)
	.bind(account_name)
	.bind(account_type)
	.bind(is_profile)
	.fetch_one(conn)
	.await?;

	Ok(row)
}

pub async fn move_raw_records(
	conn: &mut PgConnection,
	raw_record_ids: &[i64],
	logical_contact_id: i64,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE raw_records
SET logical_contact_id = $1
WHERE id = ANY($2) AND logical_contact_id <> $1",
	)
	.bind(logical_contact_id)
	.bind(raw_record_ids)
	.execute(conn)
	.await?;

	Ok(result.rows_affected())
}

pub async fn select_logical_contact(
	conn: &mut PgConnection,
	id: i64,
) -> Result<Option<LogicalContactRow>> {
	let row = sqlx::query_as(
		"\
SELECT id, display_name, display_name_source, name_raw_record_id, is_profile
FROM logical_contacts
WHERE id = $1",
	)
	.bind(id)
	.fetch_optional(conn)
	.await?;

	Ok(row)
}

pub async fn select_logical_contacts(
	conn: &mut PgConnection,
	ids: &[i64],
) -> Result<Vec<LogicalContactRow>> {
	let rows = sqlx::query_as(
		"\
SELECT id, display_name, display_name_source, name_raw_record_id, is_profile
FROM logical_contacts
WHERE id = ANY($1)
ORDER BY id",
	)
	.bind(ids)
	.fetch_all(conn)
	.await?;

	Ok(rows)
}

pub async fn insert_logical_contact(conn: &mut PgConnection, is_profile: bool) -> Result<i64> {
	let id = sqlx::query_scalar(
		"\
INSERT INTO logical_contacts (is_profile)
VALUES ($1)
RETURNING id",
	)
	.bind(is_profile)
	.fetch_one(conn)
	.await?;

	Ok(id)
}

pub async fn set_name_raw_record(
	conn: &mut PgConnection,
	logical_contact_id: i64,
	name_raw_record_id: Option<i64>,
) -> Result<()> {
	sqlx::query("UPDATE logical_contacts SET name_raw_record_id = $1 WHERE id = $2")
		.bind(name_raw_record_id)
		.bind(logical_contact_id)
		.execute(conn)
		.await?;

	Ok(())
}

pub async fn update_display_name(
	conn: &mut PgConnection,
	logical_contact_id: i64,
	display: &DisplayName,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE logical_contacts
SET
	display_name = $1,
	display_name_source = $2,
	name_raw_record_id = $3
WHERE id = $4",
	)
	.bind(display.text.as_deref())
	.bind(display.source.as_str())
	.bind(display.name_raw_record_id.map(|id| id.get()))
	.bind(logical_contact_id)
	.execute(conn)
	.await?;

	Ok(())
}

pub async fn delete_logical_contacts(conn: &mut PgConnection, ids: &[i64]) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM logical_contacts c
WHERE c.id = ANY($1)
	AND NOT EXISTS (SELECT 1 FROM raw_records r WHERE r.logical_contact_id = c.id)",
	)
	.bind(ids)
	.execute(conn)
	.await?;

	Ok(result.rows_affected())
}

pub async fn select_field_row(conn: &mut PgConnection, id: i64) -> Result<Option<FieldRowRecord>> {
	let sql = format!("{FIELD_ROW_COLUMNS}\nWHERE f.id = $1");
	let row = sqlx::query_as(&sql).bind(id).fetch_optional(conn).await?;

	Ok(row)
}

pub async fn select_field_rows(
	conn: &mut PgConnection,
	query: &FieldQuery,
) -> Result<Vec<FieldRowRecord>> {
	let order = match query.order {
		FieldOrder::Id => "f.id",
		FieldOrder::DefaultThenMostRecent => "f.is_super_primary DESC, f.last_modified DESC, f.id",
	};
	let sql = format!(
		"\
{FIELD_ROW_COLUMNS}
WHERE ($1::bigint IS NULL OR f.raw_record_id = $1)
	AND ($2::bigint IS NULL OR r.logical_contact_id = $2)
	AND ($3::text IS NULL OR f.mime_type = $3)
ORDER BY {order}
LIMIT $4"
	);
	let rows = sqlx::query_as(&sql)
		.bind(query.raw_record_id.map(|id| id.get()))
		.bind(query.logical_contact_id.map(|id| id.get()))
		.bind(query.kind.map(FieldKind::mime_type))
		.bind(query.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)))
		.fetch_all(conn)
		.await?;

	Ok(rows)
}

pub async fn insert_field_row(
	conn: &mut PgConnection,
	raw_record_id: i64,
	kind: FieldKind,
	value: &Value,
	last_modified: OffsetDateTime,
) -> Result<i64> {
	let id = sqlx::query_scalar(
		"\
INSERT INTO field_rows (raw_record_id, mime_type, value, last_modified)
VALUES ($1, $2, $3, $4)
RETURNING id",
	)
	.bind(raw_record_id)
	.bind(kind.mime_type())
	.bind(value)
	.bind(last_modified)
	.fetch_one(conn)
	.await?;

	Ok(id)
}

pub async fn clear_primary_for_raw_record(
	conn: &mut PgConnection,
	raw_record_id: i64,
	kind: FieldKind,
	super_primary: bool,
) -> Result<u64> {
	let column = if super_primary { "is_super_primary" } else { "is_primary" };
	let sql = format!(
		"\
UPDATE field_rows
SET {column} = false
WHERE raw_record_id = $1 AND mime_type = $2 AND {column}"
	);
	let result =
		sqlx::query(&sql).bind(raw_record_id).bind(kind.mime_type()).execute(conn).await?;

	Ok(result.rows_affected())
}

pub async fn clear_primary_for_contact(
	conn: &mut PgConnection,
	logical_contact_id: i64,
	kind: FieldKind,
	super_primary: bool,
) -> Result<u64> {
	let column = if super_primary { "is_super_primary" } else { "is_primary" };
	let sql = format!(
		"\
UPDATE field_rows f
SET {column} = false
FROM raw_records r
WHERE r.id = f.raw_record_id
	AND r.logical_contact_id = $1
	AND f.mime_type = $2
	AND f.{column}"
	);
	let result =
		sqlx::query(&sql).bind(logical_contact_id).bind(kind.mime_type()).execute(conn).await?;

	Ok(result.rows_affected())
}

pub async fn set_field_flags(
	conn: &mut PgConnection,
	field_row_id: i64,
	is_primary: Option<bool>,
	is_super_primary: Option<bool>,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE field_rows
SET
	is_primary = COALESCE($2, is_primary),
	is_super_primary = COALESCE($3, is_super_primary)
WHERE id = $1",
	)
	.bind(field_row_id)
	.bind(is_primary)
	.bind(is_super_primary)
	.execute(conn)
	.await?;

	Ok(result.rows_affected())
}

pub async fn demote_super_primary(conn: &mut PgConnection, field_row_ids: &[i64]) -> Result<u64> {
	let result = sqlx::query("UPDATE field_rows SET is_super_primary = false WHERE id = ANY($1)")
		.bind(field_row_ids)
		.execute(conn)
		.await?;

	Ok(result.rows_affected())
}

pub async fn select_links_touching(
	conn: &mut PgConnection,
	raw_record_ids: &[i64],
) -> Result<Vec<AggregationLinkRow>> {
	let rows = sqlx::query_as(
		"\
SELECT raw_a, raw_b, mode
FROM aggregation_links
WHERE raw_a = ANY($1) OR raw_b = ANY($1)
ORDER BY raw_a, raw_b",
	)
	.bind(raw_record_ids)
	.fetch_all(conn)
	.await?;

	Ok(rows)
}

pub async fn upsert_link(conn: &mut PgConnection, link: &AggregationLink) -> Result<u64> {
	let result = sqlx::query(
		"\
INSERT INTO aggregation_links (raw_a, raw_b, mode)
VALUES ($1, $2, $3)
ON CONFLICT (raw_a, raw_b) DO UPDATE
SET mode = EXCLUDED.mode",
	)
	.bind(link.raw_a.get())
	.bind(link.raw_b.get())
	.bind(link.mode.as_str())
	.execute(conn)
	.await?;

	Ok(result.rows_affected())
}

pub async fn delete_links_for(conn: &mut PgConnection, raw_record_id: i64) -> Result<u64> {
	let result = sqlx::query("DELETE FROM aggregation_links WHERE raw_a = $1 OR raw_b = $1")
		.bind(raw_record_id)
		.execute(conn)
		.await?;

	Ok(result.rows_affected())
}
