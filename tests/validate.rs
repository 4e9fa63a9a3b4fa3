//! Probe-based index validation: ACTIVE in DescribeTable is trusted only
//! when a query against the index is actually served by the index.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeControlPlane, init_state, spec, throttling};
use dynogsi::{
    CapacitySource, IndexBuildStatus, IndexOutcome, IndexProbe, IndexStatus, ProviderError,
    Provisioner, RetryPolicy, SharedState, Validation, Validator,
};
use tempfile::tempdir;

#[tokio::test]
async fn a_probe_served_by_the_index_is_functional() {
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);

    let verdict = Validator::new(fake).validate(&index).await;
    assert_eq!(verdict, Validation::Functional { probed_items: 0 });
    assert!(verdict.is_functional());
}

#[tokio::test]
async fn base_table_capacity_means_the_index_did_not_serve() {
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);
    fake.queue_probe(
        "bookings",
        "status-index",
        Ok(IndexProbe {
            item_count: 0,
            capacity: CapacitySource::TableOnly,
        }),
    );

    match Validator::new(fake).validate(&index).await {
        Validation::NonFunctional { reason } => {
            assert!(reason.contains("base-table capacity"), "{reason}");
        }
        other => panic!("expected NonFunctional, got {other:?}"),
    }
}

#[tokio::test]
async fn unreported_capacity_is_not_proof_of_serving() {
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);
    fake.queue_probe(
        "bookings",
        "status-index",
        Ok(IndexProbe {
            item_count: 0,
            capacity: CapacitySource::Unreported,
        }),
    );

    assert!(matches!(
        Validator::new(fake).validate(&index).await,
        Validation::NonFunctional { .. }
    ));
}

#[tokio::test]
async fn a_missing_index_is_a_validation_error() {
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);

    match Validator::new(fake).validate(&index).await {
        Validation::ValidationError { reason } => {
            assert!(reason.contains("not present"), "{reason}");
        }
        other => panic!("expected ValidationError, got {other:?}"),
    }
}

#[tokio::test]
async fn a_describe_failure_is_a_validation_error() {
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);
    fake.fail_describe("bookings", ProviderError::transport("connection refused"));

    assert!(matches!(
        Validator::new(fake).validate(&index).await,
        Validation::ValidationError { .. }
    ));
}

#[tokio::test]
async fn a_probe_query_failure_is_non_functional() {
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);
    fake.queue_probe("bookings", "status-index", Err(throttling()));

    match Validator::new(fake).validate(&index).await {
        Validation::NonFunctional { reason } => {
            assert!(reason.contains("probe query"), "{reason}");
        }
        other => panic!("expected NonFunctional, got {other:?}"),
    }
}

// ========== THROUGH THE PROVISIONER ==========

fn validating_provisioner(
    provider: Arc<FakeControlPlane>,
    state: SharedState,
    max_attempts: u32,
) -> Provisioner {
    Provisioner::new(provider, state, RetryPolicy::immediate(max_attempts))
        .with_poll_interval(Duration::ZERO)
        .with_validation(true)
}

#[tokio::test]
async fn a_persistently_non_functional_index_fails_the_record() {
    let dir = tempdir().unwrap();
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);
    for _ in 0..2 {
        fake.queue_probe(
            "bookings",
            "status-index",
            Ok(IndexProbe {
                item_count: 0,
                capacity: CapacitySource::TableOnly,
            }),
        );
    }
    let (_path, state) = init_state(&dir, std::slice::from_ref(&index));

    let provisioner = validating_provisioner(fake, state.clone(), 2);
    match provisioner.create_index(&index).await.unwrap() {
        IndexOutcome::Failed { report } => {
            assert_eq!(report.attempts, 2);
            assert!(
                report.last_error().unwrap().contains("not serving queries"),
                "{report:?}"
            );
        }
        IndexOutcome::Created { .. } => panic!("a non-serving index must not count as created"),
    }
    let record = state
        .with_store(|s| s.get("bookings", "status-index").cloned())
        .unwrap();
    assert_eq!(record.status, IndexStatus::Failed);
}

#[tokio::test]
async fn a_probe_that_recovers_on_retry_succeeds() {
    let dir = tempdir().unwrap();
    let index = spec("bookings", "status-index", "status");
    let fake = FakeControlPlane::with_tables(&["bookings"]);
    fake.put_index("bookings", "status-index", IndexBuildStatus::Active);
    // First probe says base table; the next one (unqueued) reports the index.
    fake.queue_probe(
        "bookings",
        "status-index",
        Ok(IndexProbe {
            item_count: 0,
            capacity: CapacitySource::TableOnly,
        }),
    );
    let (_path, state) = init_state(&dir, std::slice::from_ref(&index));

    let provisioner = validating_provisioner(fake, state.clone(), 5);
    match provisioner.create_index(&index).await.unwrap() {
        IndexOutcome::Created { attempts } => assert_eq!(attempts, 2),
        IndexOutcome::Failed { report } => panic!("unexpected failure: {report:?}"),
    }
    let record = state
        .with_store(|s| s.get("bookings", "status-index").cloned())
        .unwrap();
    assert_eq!(record.status, IndexStatus::Active);
    assert_eq!(record.retry_count, 1);
}
