use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{FieldRowId, LogicalContactId, RawRecordId};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
	Name,
	Nickname,
	Phone,
	Email,
	Address,
	Organization,
	Website,
	Note,
	Event,
	Im,
	Relation,
	SipAddress,
}
impl FieldKind {
	pub const ALL: [Self; 12] = [
		Self::Name,
		Self::Nickname,
		Self::Phone,
		Self::Email,
		Self::Address,
		Self::Organization,
		Self::Website,
		Self::Note,
		Self::Event,
		Self::Im,
		Self::Relation,
		Self::SipAddress,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Name => "name",
			Self::Nickname => "nickname",
			Self::Phone => "phone",
			Self::Email => "email",
			Self::Address => "address",
			Self::Organization => "organization",
			Self::Website => "website",
			Self::Note => "note",
			Self::Event => "event",
			Self::Im => "im",
			Self::Relation => "relation",
			Self::SipAddress => "sip_address",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
	}

	/// Storage tag of the kind. Stable across releases.
	pub fn mime_type(self) -> &'static str {
		match self {
			Self::Name => "vnd.android.cursor.item/name",
			Self::Nickname => "vnd.android.cursor.item/nickname",
			Self::Phone => "vnd.android.cursor.item/phone_v2",
			Self::Email => "vnd.android.cursor.item/email_v2",
			Self::Address => "vnd.android.cursor.item/postal-address_v2",
			Self::Organization => "vnd.android.cursor.item/organization",
			Self::Website => "vnd.android.cursor.item/website",
			Self::Note => "vnd.android.cursor.item/note",
			Self::Event => "vnd.android.cursor.item/contact_event",
			Self::Im => "vnd.android.cursor.item/im",
			Self::Relation => "vnd.android.cursor.item/relation",
			Self::SipAddress => "vnd.android.cursor.item/sip_address",
		}
	}

	pub fn from_mime_type(raw: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.mime_type() == raw)
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct NameValue {
	#[serde(default)]
	pub display_name: Option<String>,
	#[serde(default)]
	pub prefix: Option<String>,
	#[serde(default)]
	pub given: Option<String>,
	#[serde(default)]
	pub middle: Option<String>,
	#[serde(default)]
	pub family: Option<String>,
	#[serde(default)]
	pub suffix: Option<String>,
}
impl NameValue {
	pub fn display(display_name: impl Into<String>) -> Self {
		Self { display_name: Some(display_name.into()), ..Self::default() }
	}

	fn parts(&self) -> [Option<&str>; 5] {
		[
			self.prefix.as_deref(),
			self.given.as_deref(),
			self.middle.as_deref(),
			self.family.as_deref(),
			self.suffix.as_deref(),
		]
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
	Name(NameValue),
	Nickname { name: String },
	Phone { number: String, label: Option<String> },
	Email { address: String, label: Option<String> },
	Address { formatted: String, label: Option<String> },
	Organization { company: String, title: Option<String> },
	Website { url: String },
	Note { note: String },
	Event { date: String, label: Option<String> },
	Im { handle: String, protocol: Option<String> },
	Relation { name: String, label: Option<String> },
	SipAddress { address: String },
}
impl FieldValue {
	pub fn name(display_name: impl Into<String>) -> Self {
		Self::Name(NameValue::display(display_name))
	}

	pub fn kind(&self) -> FieldKind {
		match self {
			Self::Name(_) => FieldKind::Name,
			Self::Nickname { .. } => FieldKind::Nickname,
			Self::Phone { .. } => FieldKind::Phone,
			Self::Email { .. } => FieldKind::Email,
			Self::Address { .. } => FieldKind::Address,
			Self::Organization { .. } => FieldKind::Organization,
			Self::Website { .. } => FieldKind::Website,
			Self::Note { .. } => FieldKind::Note,
			Self::Event { .. } => FieldKind::Event,
			Self::Im { .. } => FieldKind::Im,
			Self::Relation { .. } => FieldKind::Relation,
			Self::SipAddress { .. } => FieldKind::SipAddress,
		}
	}

	/// True when every text part of the value is empty after trimming. Labels do not count.
	pub fn is_blank(&self) -> bool {
		match self {
			Self::Name(name) =>
				is_blank(name.display_name.as_deref())
					&& name.parts().into_iter().all(is_blank),
			Self::Nickname { name } | Self::Relation { name, .. } => is_blank(Some(name)),
			Self::Phone { number, .. } => is_blank(Some(number)),
			Self::Email { address, .. } | Self::SipAddress { address } =>
				is_blank(Some(address)),
			Self::Address { formatted, .. } => is_blank(Some(formatted)),
			Self::Organization { company, title } =>
				is_blank(Some(company)) && is_blank(title.as_deref()),
			Self::Website { url } => is_blank(Some(url)),
			Self::Note { note } => is_blank(Some(note)),
			Self::Event { date, .. } => is_blank(Some(date)),
			Self::Im { handle, .. } => is_blank(Some(handle)),
		}
	}

	pub fn display_text(&self) -> Option<String> {
		let text = match self {
			Self::Name(name) => match name.display_name.as_deref().map(str::trim) {
				Some(display) if !display.is_empty() => display.to_string(),
				_ => name
					.parts()
					.into_iter()
					.flatten()
					.map(str::trim)
					.filter(|part| !part.is_empty())
					.collect::<Vec<_>>()
					.join(" "),
			},
			Self::Nickname { name } | Self::Relation { name, .. } => name.trim().to_string(),
			Self::Phone { number, .. } => number.trim().to_string(),
			Self::Email { address, .. } | Self::SipAddress { address } =>
				address.trim().to_string(),
			Self::Address { formatted, .. } => formatted.trim().to_string(),
			Self::Organization { company, title } => {
				let company = company.trim();

				if company.is_empty() {
					title.as_deref().map(str::trim).unwrap_or_default().to_string()
				} else {
					company.to_string()
				}
			},
			Self::Website { url } => url.trim().to_string(),
			Self::Note { note } => note.trim().to_string(),
			Self::Event { date, .. } => date.trim().to_string(),
			Self::Im { handle, .. } => handle.trim().to_string(),
		};

		if text.is_empty() { None } else { Some(text) }
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct FieldRow {
	pub id: FieldRowId,
	pub raw_record_id: RawRecordId,
	pub logical_contact_id: LogicalContactId,
	pub value: FieldValue,
	pub is_primary: bool,
	pub is_super_primary: bool,
	#[serde(with = "crate::time_serde")]
	pub last_modified: OffsetDateTime,
}
impl FieldRow {
	pub fn kind(&self) -> FieldKind {
		self.value.kind()
	}

	/// A row is the default of its contact when it carries the super-primary flag.
	pub fn is_default(&self) -> bool {
		self.is_super_primary
	}
}

pub fn default_of<'a, I>(rows: I) -> Option<&'a FieldRow>
where
	I: IntoIterator<Item = &'a FieldRow>,
{
	rows.into_iter().find(|row| row.is_default())
}

/// Super-primary rows that share their contact and kind with another super-primary row.
///
/// A merge can bring two defaults of one kind into a contact. Neither wins; both are demoted.
pub fn conflicting_defaults(rows: &[FieldRow]) -> Vec<FieldRowId> {
	let mut by_slot: BTreeMap<(LogicalContactId, FieldKind), Vec<FieldRowId>> = BTreeMap::new();

	for row in rows.iter().filter(|row| row.is_super_primary) {
		by_slot.entry((row.logical_contact_id, row.kind())).or_default().push(row.id);
	}

	let mut conflicting: Vec<FieldRowId> =
		by_slot.into_values().filter(|ids| ids.len() > 1).flatten().collect();

	conflicting.sort();

	conflicting
}

fn is_blank(value: Option<&str>) -> bool {
	value.map(|text| text.trim().is_empty()).unwrap_or(true)
}
