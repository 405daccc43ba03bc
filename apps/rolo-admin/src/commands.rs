use clap::Subcommand;
use serde_json::Value;

use rolo_domain::{FieldRowId, LogicalContactId, RawRecordId};
use rolo_service::{ContactsService, LinkRequest};

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Aggregate contacts into one; the first id takes priority for the display name.
	Link {
		#[arg(long, value_name = "CONTACT_ID")]
		primary: i64,
		#[arg(long, value_name = "CONTACT_ID", value_delimiter = ',', num_args = 1..)]
		others: Vec<i64>,
	},
	/// Split one raw record out of its aggregate.
	Unlink {
		#[arg(value_name = "RAW_RECORD_ID", num_args = 1.., required = true)]
		raw_record_ids: Vec<i64>,
	},
	/// Split every raw record of a contact apart.
	UnlinkContact {
		#[arg(value_name = "CONTACT_ID")]
		contact_id: i64,
	},
	SetDefault {
		#[arg(value_name = "FIELD_ROW_ID")]
		field_row_id: i64,
	},
	ClearDefault {
		#[arg(value_name = "FIELD_ROW_ID")]
		field_row_id: i64,
	},
	/// Print a contact with its raw records and field rows.
	Show {
		#[arg(value_name = "CONTACT_ID")]
		contact_id: i64,
		/// Only print the default row of each kind.
		#[arg(long)]
		defaults: bool,
	},
}

pub async fn execute(service: &ContactsService, command: Command) -> color_eyre::Result<Value> {
	let value = match command {
		Command::Link { primary, others } => {
			let req = LinkRequest {
				primary: LogicalContactId(primary),
				others: others.into_iter().map(LogicalContactId).collect(),
			};

			serde_json::to_value(service.link(req).await?)?
		},
		Command::Unlink { raw_record_ids } =>
			if let [raw_record_id] = raw_record_ids.as_slice() {
				serde_json::to_value(service.unlink(RawRecordId(*raw_record_id)).await?)?
			} else {
				let ids = raw_record_ids.into_iter().map(RawRecordId).collect::<Vec<_>>();

				serde_json::to_value(service.unlink_many(&ids).await?)?
			},
		Command::UnlinkContact { contact_id } =>
			serde_json::to_value(service.unlink_contact(LogicalContactId(contact_id)).await?)?,
		Command::SetDefault { field_row_id } =>
			serde_json::to_value(service.set_as_default(FieldRowId(field_row_id)).await?)?,
		Command::ClearDefault { field_row_id } =>
			serde_json::to_value(service.clear_default(FieldRowId(field_row_id)).await?)?,
		Command::Show { contact_id, defaults: true } => serde_json::to_value(
			service.defaults_of_contact(LogicalContactId(contact_id)).await?,
		)?,
		Command::Show { contact_id, defaults: false } =>
			serde_json::to_value(service.contact(LogicalContactId(contact_id)).await?)?,
	};

	Ok(value)
}
