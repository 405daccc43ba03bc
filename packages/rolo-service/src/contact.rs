use serde::{Deserialize, Serialize};

use rolo_domain::{FieldRow, LogicalContact, LogicalContactId, RawRecord};
use rolo_storage::FieldQuery;

use crate::{CancelFn, ContactsService, Error, Result, checkpoint, never_cancel};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContactDetails {
	pub contact: LogicalContact,
	pub raw_records: Vec<RawRecord>,
	pub field_rows: Vec<FieldRow>,
}

impl ContactsService {
	pub async fn contact(&self, contact_id: LogicalContactId) -> Result<ContactDetails> {
		self.contact_with_cancel(contact_id, never_cancel()).await
	}

	pub async fn contact_with_cancel(
		&self,
		contact_id: LogicalContactId,
		cancel: &CancelFn<'_>,
	) -> Result<ContactDetails> {
		self.ensure_read()?;

		let contact = self.store.logical_contact(contact_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Contact {contact_id} does not exist.") }
		})?;
		let mut raw_records = Vec::new();

		for raw_record_id in self.store.raw_record_ids(&[contact_id]).await? {
			checkpoint(cancel, "reading raw records")?;

			if let Some(raw) = self.store.raw_record(raw_record_id).await? {
				raw_records.push(raw);
			}
		}

		let field_rows = self.store.field_rows(&FieldQuery::for_contact(contact_id)).await?;

		Ok(ContactDetails { contact, raw_records, field_rows })
	}
}
