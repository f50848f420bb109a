use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;

use huddle_chat::ChatError;
use huddle_entity::{Message, MessageType, Room, RoomKind};

use crate::support::{uuid, Fixture};

fn message_at(
    room: &Room,
    sender: &str,
    content: &str,
    at: chrono::DateTime<Utc>,
) -> Message {
    let mut message = Message::new(
        uuid(),
        room.id.clone(),
        sender.to_string(),
        content.to_string(),
        MessageType::Text,
        at,
    );
    message.updated_at = at;
    message
}

#[tokio::test]
async fn listing_requires_a_user_id() {
    let fixture = Fixture::new();
    let directory = fixture.directory();

    let err = directory.list_rooms("").await.unwrap_err();
    assert!(matches!(err, ChatError::NotAuthenticated { .. }), "got: {err}");
}

#[tokio::test]
async fn user_without_rooms_gets_an_empty_list() {
    let fixture = Fixture::new();
    let directory = fixture.directory();

    let rooms = directory.list_rooms("alice").await.unwrap();
    assert!(rooms.is_empty());
}

#[tokio::test]
async fn rooms_come_back_newest_first() {
    let fixture = Fixture::new();
    let now = Utc::now();

    for (name, age_minutes) in [("oldest", 30), ("middle", 20), ("newest", 10)] {
        let mut room = fixture.seed_room_with_members(RoomKind::Group, name, "alice", &["bob"]);
        room.created_at = now - TimeDelta::minutes(age_minutes);
        room.updated_at = room.created_at;
        fixture.repo.seed_room(room);
    }

    let directory = fixture.directory();
    let rooms = directory.list_rooms("alice").await.unwrap();
    let names: Vec<&str> = rooms.iter().map(|o| o.room.name.as_str()).collect();
    assert_eq!(names, vec!["newest", "middle", "oldest"]);
}

#[tokio::test]
async fn unread_follows_the_watermark() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob", "carol"]);
    let directory = fixture.directory();

    // Watermark at T0, then three messages from other users after it.
    let t0 = Utc::now();
    directory.mark_read(&room.id, "alice").await.unwrap();
    for i in 1..=3 {
        fixture.repo.seed_message(message_at(
            &room,
            "bob",
            &format!("update {i}"),
            t0 + TimeDelta::seconds(i),
        ));
    }

    let rooms = directory.list_rooms("alice").await.unwrap();
    assert_eq!(rooms[0].unread_count, 3);

    // Reading the room drops the count to zero...
    directory.mark_read(&room.id, "alice").await.unwrap();
    let rooms = directory.list_rooms("alice").await.unwrap();
    assert_eq!(rooms[0].unread_count, 0);

    // ...and the next message from someone else raises it again.
    fixture.repo.seed_message(message_at(
        &room,
        "carol",
        "one more",
        Utc::now() + TimeDelta::seconds(1),
    ));
    let rooms = directory.list_rooms("alice").await.unwrap();
    assert_eq!(rooms[0].unread_count, 1);
}

#[tokio::test]
async fn own_messages_never_count_as_unread() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob"]);
    let now = Utc::now();

    fixture
        .repo
        .seed_message(message_at(&room, "alice", "mine", now + TimeDelta::seconds(1)));
    fixture
        .repo
        .seed_message(message_at(&room, "bob", "theirs", now + TimeDelta::seconds(2)));

    let directory = fixture.directory();
    // No watermark yet: everything by others is unread.
    let rooms = directory.list_rooms("alice").await.unwrap();
    assert_eq!(rooms[0].unread_count, 1);
}

#[tokio::test]
async fn project_rooms_are_annotated_through_one_batch_call() {
    let fixture = Fixture::new();

    let mut apollo = fixture.seed_room_with_members(RoomKind::Group, "apollo", "alice", &[]);
    apollo.kind = RoomKind::Project;
    apollo.project_ref = Some("proj-1".to_string());
    fixture.repo.seed_room(apollo);

    let mut borealis = fixture.seed_room_with_members(RoomKind::Group, "borealis", "alice", &[]);
    borealis.kind = RoomKind::Project;
    borealis.project_ref = Some("proj-2".to_string());
    fixture.repo.seed_room(borealis);

    fixture.seed_room_with_members(RoomKind::Group, "chatter", "alice", &[]);

    let directory = fixture.directory();
    let rooms = directory.list_rooms("alice").await.unwrap();
    assert_eq!(rooms.len(), 3);

    let mut annotated: Vec<(&str, Option<&str>)> = rooms
        .iter()
        .map(|o| (o.room.name.as_str(), o.project_name.as_deref()))
        .collect();
    annotated.sort();
    assert_eq!(
        annotated,
        vec![
            ("apollo", Some("Apollo")),
            ("borealis", Some("Borealis")),
            ("chatter", None),
        ]
    );

    // One batch lookup for the whole listing, not one per project room.
    assert_eq!(fixture.projects.calls(), 1);
}

#[tokio::test]
async fn single_room_lookup_checks_membership() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob"]);
    let directory = fixture.directory();

    let found = directory.room(&room.id, "alice").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(room.id.clone()));

    let err = directory.room(&room.id, "carol").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden { .. }), "got: {err}");

    let missing = directory.room("no-such-room", "alice").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn only_participants_can_mark_read() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let directory = fixture.directory();

    let err = directory.mark_read(&room.id, "carol").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden { .. }), "got: {err}");

    let updated = directory.mark_read(&room.id, "alice").await.unwrap();
    assert!(updated.last_read_at.is_some());
}
