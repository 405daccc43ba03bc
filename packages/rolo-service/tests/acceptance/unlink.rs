use rolo_domain::{AggregationMode, LogicalContactId, RawRecordId};
use rolo_service::{Error, LinkRequest};

use super::Fixture;

async fn merged_trio(fixture: &Fixture) -> [RawRecordId; 3] {
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let (b, b1) = fixture.person(Some("Byron"), 2);
	let (c, c1) = fixture.person(Some("Claire"), 3);

	fixture
		.service
		.link(LinkRequest { primary: a, others: vec![b, c] })
		.await
		.expect("Link must succeed.");

	[a1, b1, c1]
}

#[tokio::test]
async fn unlink_isolates_only_the_named_record() {
	let fixture = Fixture::new();
	let [a1, b1, c1] = merged_trio(&fixture).await;
	let before = fixture.contact_of(a1);
	let response = fixture.service.unlink(b1).await.expect("Unlink must succeed.");

	assert_eq!(fixture.contact_of(a1), fixture.contact_of(c1));
	assert_ne!(fixture.contact_of(b1), fixture.contact_of(a1));
	assert_eq!(fixture.store.members(fixture.contact_of(b1)), vec![b1]);
	assert_eq!(fixture.contact_of(a1), before);
	assert_eq!(response.contact_ids, vec![fixture.contact_of(b1), before]);
	assert_eq!(response.links_removed, 2);

	let separate: Vec<_> = fixture
		.store
		.links()
		.into_iter()
		.filter(|link| link.mode == AggregationMode::KeepSeparate)
		.map(|link| link.pair())
		.collect();

	assert_eq!(separate, vec![(a1, b1), (b1, c1)]);
}

#[tokio::test]
async fn unlink_can_skip_the_separation_pins() {
	let mut cfg = super::test_config();

	cfg.aggregation.pin_unlinked_apart = false;

	let fixture = Fixture::with_config(cfg);
	let [a1, b1, c1] = merged_trio(&fixture).await;

	fixture.service.unlink(a1).await.expect("Unlink must succeed.");

	let pairs: Vec<_> = fixture.store.links().iter().map(|link| link.pair()).collect();

	assert_eq!(pairs, vec![(b1, c1)]);
}

#[tokio::test]
async fn unknown_raw_record_fails_without_a_batch() {
	let fixture = Fixture::new();

	for id in [RawRecordId(404), RawRecordId::UNSET] {
		let err = fixture.service.unlink(id).await.expect_err("Unlink must fail.");

		assert!(matches!(err, Error::NotFound { .. }));
	}

	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn unlinking_a_lone_record_is_a_no_op() {
	let fixture = Fixture::new();
	let (a, a1) = fixture.person(Some("Ada"), 1);
	let response = fixture.service.unlink(a1).await.expect("Unlink must succeed.");

	assert_eq!(response.contact_ids, vec![a]);
	assert_eq!(response.links_removed, 0);
	assert_eq!(fixture.store.batches_submitted(), 0);
}

#[tokio::test]
async fn unlink_contact_yields_one_contact_per_record() {
	let fixture = Fixture::new();
	let raws = merged_trio(&fixture).await;
	let merged = fixture.contact_of(raws[0]);
	let response = fixture.service.unlink_contact(merged).await.expect("Split must succeed.");

	assert_eq!(response.raw_record_ids, raws.to_vec());
	assert_eq!(response.contact_ids.len(), 3);

	let mut distinct = response.contact_ids.clone();

	distinct.sort();
	distinct.dedup();

	assert_eq!(distinct.len(), 3);
	assert!(
		fixture.store.links().iter().all(|link| link.mode == AggregationMode::KeepSeparate)
	);
}

#[tokio::test]
async fn unlink_contact_needs_two_records() {
	let fixture = Fixture::new();
	let (a, _) = fixture.person(Some("Ada"), 1);
	let err = fixture.service.unlink_contact(a).await.expect_err("Split must fail.");

	assert!(matches!(err, Error::InsufficientRawRecords { found: 1 }));

	let err =
		fixture.service.unlink_contact(LogicalContactId(404)).await.expect_err("Split must fail.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn unlink_many_reports_failures_and_keeps_going() {
	let fixture = Fixture::new();
	let [a1, b1, c1] = merged_trio(&fixture).await;
	let response = fixture
		.service
		.unlink_many(&[a1, RawRecordId(404), b1])
		.await
		.expect("Bulk unlink must succeed.");

	assert!(!response.cancelled);
	assert_eq!(response.unlinked.len(), 2);
	assert_eq!(response.failed.len(), 1);
	assert_eq!(response.failed[0].raw_record_id, RawRecordId(404));
	assert_eq!(response.failed[0].code, "NOT_FOUND");

	let contacts = [fixture.contact_of(a1), fixture.contact_of(b1), fixture.contact_of(c1)];

	assert_ne!(contacts[0], contacts[1]);
	assert_ne!(contacts[1], contacts[2]);
	assert_ne!(contacts[0], contacts[2]);
}
