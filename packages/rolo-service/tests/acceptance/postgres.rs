use std::sync::Arc;

use time::OffsetDateTime;

use rolo_domain::FieldValue;
use rolo_service::{ContactsService, LinkRequest};
use rolo_storage::{NewRawRecord, RecordStore, db::Db};
use rolo_testkit::TestDatabase;

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROLO_PG_DSN to run."]
async fn link_and_unlink_against_postgres() {
	let Some(base_dsn) = rolo_testkit::env_dsn() else {
		eprintln!("Skipping link_and_unlink_against_postgres; set ROLO_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let mut cfg = super::test_config();

	cfg.storage.postgres = test_db.postgres_config(2);

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let alice = db
		.insert_raw_record(NewRawRecord::in_account("alice@example.com", "google"))
		.await
		.expect("Failed to insert raw record.");
	let bob = db
		.insert_raw_record(NewRawRecord::in_account("bob@example.com", "google"))
		.await
		.expect("Failed to insert raw record.");

	db.insert_field_row(alice.id, FieldValue::name("Alice"), OffsetDateTime::now_utc())
		.await
		.expect("Failed to insert name.");

	let bob_name = db
		.insert_field_row(bob.id, FieldValue::name("Bob"), OffsetDateTime::now_utc())
		.await
		.expect("Failed to insert name.");
	let db = Arc::new(db);
	let service = ContactsService::new(cfg, db.clone());

	service.set_as_default(bob_name.id).await.expect("Failed to mark Bob default.");

	let request =
		LinkRequest { primary: alice.logical_contact_id, others: vec![bob.logical_contact_id] };
	let response = service.link(request).await.expect("Link must succeed.");
	let merged = response.contact_id.expect("Merged contact must be reported.");
	let contact =
		db.logical_contact(merged).await.expect("Read failed.").expect("Contact must exist.");

	assert_eq!(contact.display_name.as_deref(), Some("Bob"));
	assert_eq!(db.raw_record_ids(&[merged]).await.expect("Read failed."), vec![alice.id, bob.id]);

	let response = service.unlink(bob.id).await.expect("Unlink must succeed.");

	assert_eq!(response.contact_ids.len(), 2);
	assert_eq!(db.raw_record_ids(&[merged]).await.expect("Read failed.").len(), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
