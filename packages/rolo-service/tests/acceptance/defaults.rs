use rolo_domain::{FieldKind, FieldRowId, FieldValue, LogicalContactId};
use rolo_service::{Error, LinkRequest};
use rolo_storage::{FieldQuery, RecordStore};

use super::Fixture;

fn phone(number: &str) -> FieldValue {
	FieldValue::Phone { number: number.to_string(), label: None }
}

#[tokio::test]
async fn at_most_one_default_per_kind_and_contact() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(None, 1);

	fixture
		.service
		.link(LinkRequest { primary: a, others: vec![b] })
		.await
		.expect("Link must succeed.");

	let work = fixture.field(a1, phone("555-0100"), 1);
	let home = fixture.field(a1, phone("555-0101"), 2);
	let mobile = fixture.field(b1, phone("555-0102"), 3);
	let contact = fixture.contact_of(a1);

	for (id, set) in
		[(work.id, true), (mobile.id, true), (home.id, true), (mobile.id, false), (work.id, true)]
	{
		if set {
			fixture.service.set_as_default(id).await.expect("Set must succeed.");
		} else {
			fixture.service.clear_default(id).await.expect("Clear must succeed.");
		}

		let phones = fixture
			.store
			.field_rows(&FieldQuery::for_contact(contact).kind(FieldKind::Phone))
			.await
			.expect("Read failed.");

		assert!(phones.iter().filter(|row| row.is_super_primary).count() <= 1);

		for raw in [a1, b1] {
			assert!(
				phones.iter().filter(|row| row.raw_record_id == raw && row.is_primary).count()
					<= 1
			);
		}
	}

	let defaults = fixture.service.defaults_of_contact(contact).await.expect("Read failed.");
	let default_phone = defaults
		.iter()
		.find(|row| row.kind() == FieldKind::Phone)
		.expect("A default phone must exist.");

	assert_eq!(default_phone.id, work.id);
}

#[tokio::test]
async fn clear_default_leaves_no_default() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(None, 1);
	let row = fixture.field(a1, phone("555-0100"), 1);
	let response = fixture.service.set_as_default(row.id).await.expect("Set must succeed.");

	assert!(response.is_default);
	assert_eq!(response.logical_contact_id, a);

	let response = fixture.service.clear_default(row.id).await.expect("Clear must succeed.");

	assert!(!response.is_default);

	let stored =
		fixture.store.field_row(row.id).await.expect("Read failed.").expect("Row exists.");

	assert!(!stored.is_primary && !stored.is_super_primary);
	assert!(fixture.service.defaults_of_contact(a).await.expect("Read failed.").is_empty());
}

#[tokio::test]
async fn default_requires_a_stored_row() {
	let fixture = Fixture::new();
	let err = fixture
		.service
		.set_as_default(FieldRowId::UNSET)
		.await
		.expect_err("Unset id must be refused.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let err = fixture
		.service
		.clear_default(FieldRowId(404))
		.await
		.expect_err("Unknown row must be refused.");

	assert!(matches!(err, Error::NotFound { .. }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn rejected_default_batch_changes_nothing() {
	let fixture = Fixture::new();
	let (_, a1) = fixture.person(None, 1);
	let first = fixture.field(a1, phone("555-0100"), 1);
	let second = fixture.field(a1, phone("555-0101"), 2);

	fixture.service.set_as_default(first.id).await.expect("Set must succeed.");
	fixture.store.reject_next_batch("Store busy.");

	let err = fixture.service.set_as_default(second.id).await.expect_err("Set must fail.");

	assert!(matches!(err, Error::BatchRejected { .. }));

	let first =
		fixture.store.field_row(first.id).await.expect("Read failed.").expect("Row exists.");

	assert!(first.is_super_primary);
}

#[tokio::test]
async fn defaults_need_permissions() {
	let fixture = Fixture::with_grant(false, false);

	assert!(matches!(
		fixture.service.set_as_default(FieldRowId(1)).await,
		Err(Error::PermissionDenied { .. })
	));
	assert!(matches!(
		fixture.service.defaults_of_contact(LogicalContactId(1)).await,
		Err(Error::PermissionDenied { .. })
	));
	assert!(matches!(
		fixture.service.contact(LogicalContactId(1)).await,
		Err(Error::PermissionDenied { .. })
	));
}

#[tokio::test]
async fn contact_details_list_members_and_rows() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);

	fixture.service.link_all(&[a, b]).await.expect("Link must succeed.");

	let details = fixture.service.contact(fixture.contact_of(a1)).await.expect("Read failed.");

	assert_eq!(details.raw_records.iter().map(|raw| raw.id).collect::<Vec<_>>(), vec![a1, b1]);
	assert_eq!(details.field_rows.len(), 2);
	assert_eq!(details.contact.display_name.as_deref(), Some("Ada"));

	let json = serde_json::to_value(&details).expect("Details must serialize.");

	assert_eq!(json["field_rows"][0]["value"]["kind"], "name");
}
