use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use huddle_chat::{ChatConfig, ChatError, RepositoryError, StoreGuard};
use huddle_entity::RoomKind;

use crate::support::{test_config, Fixture};

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let attempts = AtomicU32::new(0);
    let guard = StoreGuard::new(&test_config());

    let result: Result<u32, ChatError> = guard
        .run("test.op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(RepositoryError::unavailable("flaky"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_stop_at_the_attempt_budget() {
    let attempts = AtomicU32::new(0);
    let guard = StoreGuard::new(&test_config());

    let result: Result<(), ChatError> = guard
        .run("test.op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(RepositoryError::unavailable("still down")) }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_transient(), "got: {err}");
    assert_eq!(attempts.load(Ordering::SeqCst), test_config().store_attempts);
}

#[tokio::test]
async fn conflicts_are_not_retried() {
    let attempts = AtomicU32::new(0);
    let guard = StoreGuard::new(&test_config());

    let result: Result<(), ChatError> = guard
        .run("test.op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(RepositoryError::conflict("duplicate")) }
        })
        .await;

    assert!(matches!(result.unwrap_err(), ChatError::Conflict { .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn services_recover_from_brief_store_outages() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let directory = fixture.directory();

    // Two failures, then the store is back: the caller never notices.
    let before = fixture.repo.calls();
    fixture.repo.fail_next(2);
    let found = directory.room(&room.id, "alice").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(room.id));
    // Three attempts on the room read plus the membership check.
    assert_eq!(fixture.repo.calls() - before, 4);
}

#[tokio::test]
async fn persistent_outages_surface_as_dependency_unavailable() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let directory = fixture.directory();

    fixture.repo.fail_next(20);
    let err = directory.room(&room.id, "alice").await.unwrap_err();
    assert!(err.is_transient(), "got: {err}");
}

#[tokio::test]
async fn hung_store_calls_time_out_instead_of_hanging_the_session() {
    let config = ChatConfig {
        store_timeout: Duration::from_millis(50),
        store_attempts: 2,
        retry_base_delay: Duration::from_millis(5),
        retry_max_delay: Duration::from_millis(10),
        ..test_config()
    };
    let fixture = Fixture::with_config(config);
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let directory = fixture.directory();

    fixture.repo.hang_next(2);
    let started = Instant::now();
    let err = directory.room(&room.id, "alice").await.unwrap_err();
    assert!(err.is_transient(), "got: {err}");
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "timed out promptly, took {:?}",
        started.elapsed()
    );
}
