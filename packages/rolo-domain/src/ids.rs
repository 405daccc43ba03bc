//! Store-assigned row identifiers.
//!
//! Every id is a positive integer handed out by the record store. `UNSET` marks a value that
//! has not been persisted yet and is never accepted by an operation.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

macro_rules! store_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
		#[serde(transparent)]
		pub struct $name(pub i64);
		impl $name {
			pub const UNSET: Self = Self(-1);

			pub fn get(self) -> i64 {
				self.0
			}

			pub fn is_valid(self) -> bool {
				self.0 > 0
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
				write!(f, "{}", self.0)
			}
		}
		impl From<i64> for $name {
			fn from(value: i64) -> Self {
				Self(value)
			}
		}
	};
}

store_id!(
	/// Identifies one account-owned raw record.
	RawRecordId
);
store_id!(
	/// Identifies a logical contact. Not stable across merges and splits.
	LogicalContactId
);
store_id!(FieldRowId);
