use std::sync::Arc;

use rolo_domain::{LogicalContactId, RawRecordId};
use rolo_service::{ContactsService, Error, LinkRequest};
use rolo_storage::RecordStore;

use super::{CountingStore, Fixture, Grant};

fn request(primary: LogicalContactId, others: &[LogicalContactId]) -> LinkRequest {
	LinkRequest { primary, others: others.to_vec() }
}

#[tokio::test]
async fn link_merges_every_raw_record_into_one_contact() {
	let fixture = Fixture::new();
	let (x, x1) = fixture.person(Some("Xavier"), 1);
	let (y, y1) = fixture.person(None, 2);
	let (z, z1) = fixture.person(None, 3);
	let response = fixture.service.link(request(x, &[y, z])).await.expect("Link must succeed.");

	assert_eq!(response.raw_record_ids, vec![x1, y1, z1]);
	assert_eq!(response.links_submitted, 3);
	assert_eq!(response.contact_id, Some(fixture.contact_of(x1)));

	for raw in [y1, z1] {
		assert_eq!(fixture.contact_of(raw), fixture.contact_of(x1));
	}

	let pairs: Vec<(RawRecordId, RawRecordId)> =
		fixture.store.links().iter().map(|link| link.pair()).collect();

	assert_eq!(pairs, vec![(x1, y1), (x1, z1), (y1, z1)]);
}

#[tokio::test]
async fn relinking_a_merged_contact_keeps_membership() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);

	fixture.service.link(request(a, &[b])).await.expect("Link must succeed.");

	let merged = fixture.contact_of(a1);
	let members = fixture.store.members(merged);
	let response =
		fixture.service.link(request(merged, &[b, a])).await.expect("Relink must succeed.");

	assert_eq!(response.contact_id, Some(merged));
	assert_eq!(fixture.store.members(merged), members);
	assert_eq!(fixture.contact_of(b1), merged);
	assert_eq!(fixture.store.contact_ids().len(), 1);
}

#[tokio::test]
async fn link_needs_two_distinct_contacts() {
	let fixture = Fixture::new();
	let (a, _) = fixture.person(Some("Ada"), 1);

	for others in [vec![], vec![a], vec![a, LogicalContactId::UNSET, LogicalContactId(0)]] {
		let err = fixture
			.service
			.link(request(a, &others))
			.await
			.expect_err("Link with one contact must fail.");

		assert!(matches!(err, Error::InsufficientCandidates { found: 1 }));
	}

	let err = fixture.service.link_all(&[]).await.expect_err("Empty link must fail.");

	assert!(matches!(err, Error::InsufficientCandidates { found: 0 }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn link_needs_two_raw_records() {
	let fixture = Fixture::new();
	let (a, _) = fixture.person(Some("Ada"), 1);
	let err = fixture
		.service
		.link(request(a, &[LogicalContactId(404)]))
		.await
		.expect_err("Link with one raw record must fail.");

	assert!(matches!(err, Error::InsufficientRawRecords { found: 1 }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn link_requires_an_existing_primary() {
	let fixture = Fixture::new();
	let (a, _) = fixture.person(Some("Ada"), 1);
	let err = fixture
		.service
		.link(request(LogicalContactId(404), &[a]))
		.await
		.expect_err("Unknown primary must fail.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn profile_contacts_are_never_linked() {
	let fixture = Fixture::new();
	let (a, _) = fixture.person(Some("Ada"), 1);
	let me = fixture.store.insert_raw_record(rolo_storage::NewRawRecord::profile());
	let err = fixture
		.service
		.link(request(a, &[me.logical_contact_id]))
		.await
		.expect_err("Profile link must fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn write_permission_is_checked_before_any_store_access() {
	let fixture = Fixture::with_grant(true, false);
	let err = fixture
		.service
		.link(request(LogicalContactId(1), &[LogicalContactId(2)]))
		.await
		.expect_err("Link without write access must fail.");

	assert!(matches!(err, Error::PermissionDenied { .. }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn read_permission_is_checked_before_any_store_access() {
	let fixture = Fixture::new();
	let (a, _) = fixture.person(Some("Ada"), 1);
	let (b, _) = fixture.person(Some("Byron"), 2);
	let store = Arc::new(CountingStore::new(fixture.store.clone()));
	let service = ContactsService::with_access(
		super::test_config(),
		store.clone(),
		Arc::new(Grant { read: false, write: true }),
	);
	let err = service
		.link(request(a, &[b]))
		.await
		.expect_err("Link that restores the default name needs read access.");

	assert!(matches!(err, Error::PermissionDenied { .. }));
	assert_eq!(store.reads(), 0);
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn write_only_link_succeeds_without_name_restore() {
	let mut cfg = super::test_config();

	cfg.aggregation.restore_default_name = false;

	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);
	let service = ContactsService::with_access(
		cfg,
		fixture.store.clone(),
		Arc::new(Grant { read: false, write: true }),
	);
	let response = service.link(request(a, &[b])).await.expect("Link must succeed.");

	assert_eq!(response.default_name_row_id, None);
	assert_eq!(fixture.contact_of(a1), fixture.contact_of(b1));
}

#[tokio::test]
async fn rejected_batch_leaves_contacts_apart() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);

	fixture.store.reject_next_batch("Sync in progress.");

	let err = fixture.service.link(request(a, &[b])).await.expect_err("Link must fail.");

	assert!(matches!(err, Error::BatchRejected { .. }));
	assert_ne!(fixture.contact_of(a1), fixture.contact_of(b1));
	assert!(fixture.store.links().is_empty());
}

#[tokio::test]
async fn super_primary_name_of_a_later_contact_wins() {
	let fixture = Fixture::new();
	let (alice, a1) = fixture.person(Some("Alice"), 5);
	let (bob, b1) = fixture.person(None, 1);
	let bob_name = fixture.name_row(b1, "Bob", 1);

	fixture.service.set_as_default(bob_name.id).await.expect("Failed to mark Bob default.");

	let response =
		fixture.service.link(request(alice, &[bob])).await.expect("Link must succeed.");
	let merged = fixture.contact_of(a1);

	assert_eq!(fixture.contact_of(b1), merged);
	assert_eq!(response.contact_id, Some(merged));
	assert_eq!(response.default_name_row_id, Some(bob_name.id));

	let bob_name =
		fixture.store.field_row(bob_name.id).await.expect("Read failed.").expect("Row exists.");

	assert!(bob_name.is_super_primary);

	let contact = fixture
		.store
		.logical_contact(merged)
		.await
		.expect("Read failed.")
		.expect("Contact exists.");

	assert_eq!(contact.display_name.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn pinned_name_source_outranks_recency() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, _) = fixture.person(Some("Byron"), 9);

	fixture.store.pin_name_source(a, a1).expect("Failed to pin the name source.");

	let priority =
		fixture.service.resolve_priority(b, &[a]).await.expect("Resolution must succeed.");
	let source = priority.default_name.expect("A name source must be found.");

	assert_eq!(priority.ordered_ids, vec![b, a]);
	assert_eq!(source.raw_record_id, a1);
}

#[tokio::test]
async fn most_recent_name_breaks_the_tie_without_settled_names() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(None, 0);
	let (b, _) = fixture.person(Some("Byron"), 9);
	let newest = fixture.name_row(a1, "Ada", 20);

	fixture.name_row(a1, "Ada (old)", 2);

	let priority =
		fixture.service.resolve_priority(a, &[b]).await.expect("Resolution must succeed.");

	assert_eq!(priority.default_name.map(|source| source.field_row_id), Some(newest.id));
}

#[tokio::test]
async fn link_without_names_reports_the_first_record_contact() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(None, 0);
	let (b, _) = fixture.person(None, 0);
	let response = fixture.service.link_all(&[a, b]).await.expect("Link must succeed.");

	assert_eq!(response.default_name_row_id, None);
	assert_eq!(response.contact_id, Some(fixture.contact_of(a1)));
}

#[tokio::test]
async fn oversized_links_are_refused() {
	let mut cfg = super::test_config();

	cfg.aggregation.max_link_raw_records = 2;

	let fixture = Fixture::with_config(cfg);
	let ids: Vec<LogicalContactId> = (0..3).map(|i| fixture.person(None, i).0).collect();
	let err = fixture.service.link_all(&ids).await.expect_err("Oversized link must fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}
