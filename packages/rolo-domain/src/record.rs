use serde::{Deserialize, Serialize};

use crate::{
	display::DisplayNameSource,
	ids::{LogicalContactId, RawRecordId},
};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Account {
	pub name: String,
	pub account_type: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct RawRecord {
	pub id: RawRecordId,
	pub logical_contact_id: LogicalContactId,
	pub account: Option<Account>,
	pub is_profile: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct LogicalContact {
	pub id: LogicalContactId,
	pub display_name: Option<String>,
	pub display_name_source: DisplayNameSource,
	/// Raw record the display name was taken from. Only reported when the store settled on a
	/// specific name row rather than a recency guess.
	pub name_raw_record_id: Option<RawRecordId>,
	pub is_profile: bool,
}
