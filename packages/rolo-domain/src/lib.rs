pub mod aggregation;
pub mod display;
pub mod field;
pub mod ids;
pub mod record;
pub mod time_serde;

pub use aggregation::{AggregationLink, AggregationMode, Group, Regrouping};
pub use display::{DisplayName, DisplayNameSource};
pub use field::{FieldKind, FieldRow, FieldValue, NameValue};
pub use ids::{FieldRowId, LogicalContactId, RawRecordId};
pub use record::{Account, LogicalContact, RawRecord};
