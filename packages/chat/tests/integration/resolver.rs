use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;

use huddle_chat::ChatError;
use huddle_entity::{Participant, ParticipantRole, Room, RoomKind};

use crate::support::{uuid, Fixture};

#[tokio::test]
async fn self_chat_is_rejected() {
    let fixture = Fixture::new();
    let resolver = fixture.resolver();

    let err = resolver.resolve("alice", "alice", "alice").await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidArgument { .. }), "got: {err}");
    assert_eq!(fixture.repo.room_count(), 0);
}

#[tokio::test]
async fn caller_must_be_one_of_the_pair() {
    let fixture = Fixture::new();
    let resolver = fixture.resolver();

    let err = resolver.resolve("carol", "alice", "bob").await.unwrap_err();
    assert!(matches!(err, ChatError::NotAuthenticated { .. }), "got: {err}");

    let err = resolver.resolve("", "alice", "bob").await.unwrap_err();
    assert!(matches!(err, ChatError::NotAuthenticated { .. }), "got: {err}");
}

#[tokio::test]
async fn first_contact_creates_then_reuses() {
    let fixture = Fixture::new();
    let resolver = fixture.resolver();

    let created = resolver.resolve("alice", "alice", "bob").await.unwrap();
    assert_eq!(created.kind, RoomKind::Direct);
    assert_eq!(created.created_by, "alice");
    assert_eq!(
        created.direct_key.as_deref(),
        Some(Room::direct_key_for("alice", "bob").as_str())
    );

    // Same pair from the other side, in the other order.
    let reused = resolver.resolve("bob", "bob", "alice").await.unwrap();
    assert_eq!(reused.id, created.id);
    assert_eq!(fixture.repo.room_count(), 1);
    assert_eq!(fixture.repo.participant_count(), 2);

    let alice = fixture
        .repo
        .stored_participant(&created.id, "alice")
        .expect("creator participant");
    assert_eq!(alice.role, ParticipantRole::Admin);
    let bob = fixture
        .repo
        .stored_participant(&created.id, "bob")
        .expect("counterpart participant");
    assert_eq!(bob.role, ParticipantRole::Member);
}

#[tokio::test]
async fn concurrent_first_contact_creates_exactly_one_room() {
    let fixture = Fixture::new();
    // Two resolver instances share the store but not the pair locks, the
    // same shape as two server processes racing.
    let left = fixture.resolver();
    let right = fixture.resolver();

    let (a, b) = tokio::join!(
        left.resolve("alice", "alice", "bob"),
        right.resolve("bob", "bob", "alice"),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(fixture.repo.room_count(), 1);
    assert_eq!(fixture.repo.participant_count(), 2);
}

#[tokio::test]
async fn repeated_resolution_is_idempotent() {
    let fixture = Fixture::new();
    let resolver = fixture.resolver();

    let first = resolver.resolve("alice", "alice", "bob").await.unwrap();
    for _ in 0..5 {
        let again = resolver.resolve("alice", "alice", "bob").await.unwrap();
        assert_eq!(again.id, first.id);
    }
    assert_eq!(fixture.repo.room_count(), 1);
}

#[tokio::test]
async fn pre_existing_duplicates_resolve_to_earliest_created() {
    let fixture = Fixture::new();
    let now = Utc::now();

    // Stage a store that already violates the dedup invariant.
    let mut older = Room::new(
        uuid(),
        String::new(),
        RoomKind::Direct,
        "alice".to_string(),
        now - TimeDelta::minutes(10),
    );
    older.direct_key = Some(Room::direct_key_for("alice", "bob"));
    let mut newer = Room::new(
        uuid(),
        String::new(),
        RoomKind::Direct,
        "bob".to_string(),
        now,
    );
    newer.direct_key = Some(Room::direct_key_for("alice", "bob"));
    for room in [&older, &newer] {
        fixture.repo.seed_room(room.clone());
        for user in ["alice", "bob"] {
            fixture.repo.seed_participant(Participant::new(
                room.id.clone(),
                user.to_string(),
                ParticipantRole::Member,
                now,
            ));
        }
    }

    let resolver = fixture.resolver();
    let resolved = resolver.resolve("alice", "alice", "bob").await.unwrap();
    assert_eq!(resolved.id, older.id);

    // Resolution never "repairs" by creating more rooms.
    assert_eq!(fixture.repo.room_count(), 2);
}
