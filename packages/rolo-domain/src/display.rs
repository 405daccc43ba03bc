use serde::{Deserialize, Serialize};

use crate::{
	field::{FieldKind, FieldRow},
	ids::RawRecordId,
};

/// Kind of field a contact's display name was derived from, weakest first.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayNameSource {
	#[default]
	Undefined,
	Email,
	Phone,
	Organization,
	Nickname,
	StructuredName,
}
impl DisplayNameSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Undefined => "undefined",
			Self::Email => "email",
			Self::Phone => "phone",
			Self::Organization => "organization",
			Self::Nickname => "nickname",
			Self::StructuredName => "structured_name",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		[
			Self::Undefined,
			Self::Email,
			Self::Phone,
			Self::Organization,
			Self::Nickname,
			Self::StructuredName,
		]
		.into_iter()
		.find(|source| source.as_str() == raw)
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayName {
	pub text: Option<String>,
	pub source: DisplayNameSource,
	pub name_raw_record_id: Option<RawRecordId>,
}

const FALLBACK_KINDS: [(FieldKind, DisplayNameSource); 4] = [
	(FieldKind::Nickname, DisplayNameSource::Nickname),
	(FieldKind::Organization, DisplayNameSource::Organization),
	(FieldKind::Phone, DisplayNameSource::Phone),
	(FieldKind::Email, DisplayNameSource::Email),
];

/// Derives a contact's display name from the field rows of all its members.
///
/// `pinned` is the name raw record the contact carried before the refresh. It only counts
/// while that record is still a member owning a usable name.
pub fn choose_display_name(rows: &[FieldRow], pinned: Option<RawRecordId>) -> DisplayName {
	let names = || {
		rows.iter().filter(|row| row.kind() == FieldKind::Name && !row.value.is_blank())
	};

	if let Some(row) = names().filter(|row| row.is_super_primary).min_by_key(|row| row.id) {
		return settled(row);
	}
	if let Some(pinned) = pinned
		&& let Some(row) =
			names().filter(|row| row.raw_record_id == pinned).min_by_key(|row| row.id)
	{
		return settled(row);
	}
	if let Some(row) = names().min_by(|a, b| {
		b.last_modified.cmp(&a.last_modified).then_with(|| a.id.cmp(&b.id))
	}) {
		return DisplayName {
			text: row.value.display_text(),
			source: DisplayNameSource::StructuredName,
			name_raw_record_id: None,
		};
	}

	for (kind, source) in FALLBACK_KINDS {
		let best = rows
			.iter()
			.filter(|row| row.kind() == kind && !row.value.is_blank())
			.min_by(|a, b| {
				b.is_super_primary
					.cmp(&a.is_super_primary)
					.then_with(|| b.is_primary.cmp(&a.is_primary))
					.then_with(|| a.id.cmp(&b.id))
			});

		if let Some(row) = best {
			return DisplayName { text: row.value.display_text(), source, name_raw_record_id: None };
		}
	}

	DisplayName::default()
}

fn settled(row: &FieldRow) -> DisplayName {
	DisplayName {
		text: row.value.display_text(),
		source: DisplayNameSource::StructuredName,
		name_raw_record_id: Some(row.raw_record_id),
	}
}
