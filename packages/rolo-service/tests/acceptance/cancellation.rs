use std::sync::atomic::{AtomicUsize, Ordering};

use rolo_service::{Error, LinkRequest};

use super::Fixture;

#[tokio::test]
async fn cancelled_link_submits_nothing() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);
	let cancel = || true;
	let err = fixture
		.service
		.link_with_cancel(LinkRequest { primary: a, others: vec![b] }, &cancel)
		.await
		.expect_err("Cancelled link must fail.");

	assert!(matches!(err, Error::Cancelled { .. }));
	assert_eq!(fixture.store.batches_submitted(), 0);
	assert_ne!(fixture.contact_of(a1), fixture.contact_of(b1));
}

#[tokio::test]
async fn cancel_before_planning_stops_after_name_resolution() {
	let mut cfg = super::test_config();

	cfg.aggregation.restore_default_name = false;

	let fixture = Fixture::with_config(cfg);
	let (a, _) = fixture.person(Some("Ada"), 1);
	let (b, _) = fixture.person(Some("Byron"), 2);
	let cancel = || true;
	let err = fixture
		.service
		.link_with_cancel(LinkRequest { primary: a, others: vec![b] }, &cancel)
		.await
		.expect_err("Cancelled link must fail.");

	assert!(matches!(err, Error::Cancelled { stage: "planning" }));
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn cancelled_bulk_unlink_keeps_committed_work() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);
	let (c, c1) = fixture.person(Some("Claire"), 3);

	fixture.service.link_all(&[a, b, c]).await.expect("Link must succeed.");

	let polls = AtomicUsize::new(0);
	// One poll per item plus two inside each unlink; the fourth poll precedes the second item.
	let cancel = || polls.fetch_add(1, Ordering::SeqCst) >= 3;
	let response = fixture
		.service
		.unlink_many_with_cancel(&[a1, b1, c1], &cancel)
		.await
		.expect("Bulk unlink must return its progress.");

	assert!(response.cancelled);
	assert_eq!(response.unlinked.len(), 1);
	assert_eq!(fixture.store.members(fixture.contact_of(a1)), vec![a1]);
	assert_eq!(fixture.contact_of(b1), fixture.contact_of(c1));
}
