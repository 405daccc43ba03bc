use serde_json::Value;
use time::OffsetDateTime;

use rolo_domain::{
	Account, AggregationLink, AggregationMode, DisplayNameSource, FieldKind, FieldRow,
	FieldValue, LogicalContact, LogicalContactId, RawRecord, RawRecordId, ids::FieldRowId,
};

use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
pub struct RawRecordRow {
	pub id: i64,
	pub logical_contact_id: i64,
	pub account_name: Option<String>,
	pub account_type: Option<String>,
	pub is_profile: bool,
}
impl RawRecordRow {
	pub fn into_domain(self) -> RawRecord {
		let account = match (self.account_name, self.account_type) {
			(Some(name), Some(account_type)) => Some(Account { name, account_type }),
			_ => None,
		};

		RawRecord {
			id: RawRecordId(self.id),
			logical_contact_id: LogicalContactId(self.logical_contact_id),
			account,
			is_profile: self.is_profile,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct LogicalContactRow {
	pub id: i64,
	pub display_name: Option<String>,
	pub display_name_source: String,
	pub name_raw_record_id: Option<i64>,
	pub is_profile: bool,
}
impl LogicalContactRow {
	pub fn into_domain(self) -> Result<LogicalContact> {
		let display_name_source = DisplayNameSource::parse(&self.display_name_source)
			.ok_or_else(|| {
				Error::InvalidArgument(format!(
					"Unknown display name source {:?} on contact {}.",
					self.display_name_source, self.id
				))
			})?;

		Ok(LogicalContact {
			id: LogicalContactId(self.id),
			display_name: self.display_name,
			display_name_source,
			name_raw_record_id: self.name_raw_record_id.map(RawRecordId),
			is_profile: self.is_profile,
		})
	}
}

/// A `field_rows` row joined with the owning raw record's current contact.
#[derive(Debug, sqlx::FromRow)]
pub struct FieldRowRecord {
	pub id: i64,
	pub raw_record_id: i64,
	pub logical_contact_id: i64,
	pub mime_type: String,
	pub value: Value,
	pub is_primary: bool,
	pub is_super_primary: bool,
	pub last_modified: OffsetDateTime,
}
impl FieldRowRecord {
	pub fn into_domain(self) -> Result<FieldRow> {
		let kind = FieldKind::from_mime_type(&self.mime_type).ok_or_else(|| {
			Error::InvalidArgument(format!(
				"Unknown mime type {:?} on field row {}.",
				self.mime_type, self.id
			))
		})?;
		let value: FieldValue = serde_json::from_value(self.value)?;

		if value.kind() != kind {
			return Err(Error::InvalidArgument(format!(
				"Field row {} is tagged {} but stores a {} value.",
				self.id,
				kind.as_str(),
				value.kind().as_str()
			)));
		}

		Ok(FieldRow {
			id: FieldRowId(self.id),
			raw_record_id: RawRecordId(self.raw_record_id),
			logical_contact_id: LogicalContactId(self.logical_contact_id),
			value,
			is_primary: self.is_primary,
			is_super_primary: self.is_super_primary,
			last_modified: self.last_modified,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct AggregationLinkRow {
	pub raw_a: i64,
	pub raw_b: i64,
	pub mode: String,
}
impl AggregationLinkRow {
	pub fn into_domain(self) -> Result<AggregationLink> {
		let mode = AggregationMode::parse(&self.mode).ok_or_else(|| {
			Error::InvalidArgument(format!("Unknown aggregation mode {:?}.", self.mode))
		})?;

		AggregationLink::new(RawRecordId(self.raw_a), RawRecordId(self.raw_b), mode).ok_or_else(|| {
			Error::InvalidArgument(format!("Aggregation link pairs {} with itself.", self.raw_a))
		})
	}
}
