use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;

use huddle_chat::ChatError;
use huddle_entity::{Message, MessageType, Room, RoomKind};

use crate::support::Fixture;

fn message_at(room: &Room, sender: &str, content: &str, id: &str, at: chrono::DateTime<Utc>) -> Message {
    let mut message = Message::new(
        id.to_string(),
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
async fn blank_content_is_rejected() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let service = fixture.messages();

    for content in ["", "   ", "\n\t"] {
        let err = service.send_message(&room.id, "alice", content).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidArgument { .. }), "got: {err}");
    }
    assert_eq!(fixture.repo.message_count(), 0);
}

#[tokio::test]
async fn only_participants_can_send() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let service = fixture.messages();

    let err = service.send_message(&room.id, "carol", "hi").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden { .. }), "got: {err}");

    // A room that no longer exists has no participants either.
    let err = service.send_message("gone-room", "alice", "hi").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden { .. }), "got: {err}");
}

#[tokio::test]
async fn sent_messages_carry_server_time_and_text_type() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &[]);
    let service = fixture.messages();

    let before = Utc::now();
    let sent = service.send_message(&room.id, "alice", "hello world").await.unwrap();
    let after = Utc::now();

    assert_eq!(sent.message_type, MessageType::Text);
    assert!(!sent.is_edited && !sent.is_deleted);
    assert!(sent.created_at >= before && sent.created_at <= after);
    assert_eq!(fixture.repo.message_count(), 1);
}

#[tokio::test]
async fn listing_orders_by_time_then_id_and_joins_profiles() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob"]);
    let now = Utc::now();

    // Two ties on created_at plus one later message, seeded out of order.
    fixture.repo.seed_message(message_at(&room, "bob", "tie two", "m-b", now));
    fixture.repo.seed_message(message_at(&room, "alice", "later", "m-c", now + TimeDelta::seconds(9)));
    fixture.repo.seed_message(message_at(&room, "alice", "tie one", "m-a", now));
    // A sender the profile service no longer knows.
    fixture.repo.seed_message(message_at(&room, "mallory", "??", "m-d", now + TimeDelta::seconds(20)));

    let service = fixture.messages();
    let listed = service.list_messages(&room.id, None).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|v| v.message.id.as_str()).collect();
    assert_eq!(ids, vec!["m-a", "m-b", "m-c", "m-d"]);

    assert_eq!(
        listed[0].sender.as_ref().map(|p| p.display_name.as_str()),
        Some("Alice")
    );
    assert!(listed[3].sender.is_none());
    // One batch profile lookup for the page.
    assert_eq!(fixture.profiles.calls(), 1);

    let limited = service.list_messages(&room.id, Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].message.id, "m-a");
}

#[tokio::test]
async fn edits_are_author_only_and_tracked() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob"]);
    let service = fixture.messages();

    let sent = service.send_message(&room.id, "alice", "draft").await.unwrap();

    let err = service.edit_message(&sent.id, "bob", "hijacked").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden { .. }), "got: {err}");

    let edited = service.edit_message(&sent.id, "alice", "final").await.unwrap();
    assert_eq!(edited.content, "final");
    assert!(edited.is_edited);
    assert!(edited.updated_at >= sent.updated_at);

    let err = service.edit_message("no-such-id", "alice", "x").await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidArgument { .. }), "got: {err}");
}

#[tokio::test]
async fn deletion_redacts_but_keeps_the_row() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob"]);
    let service = fixture.messages();

    let first = service.send_message(&room.id, "bob", "one").await.unwrap();
    let second = service.send_message(&room.id, "bob", "two").await.unwrap();

    let deleted = service.delete_message(&first.id, "bob").await.unwrap();
    assert!(deleted.is_deleted);
    assert!(deleted.content.is_empty());

    let stored = fixture.repo.stored_message(&first.id).unwrap();
    assert!(stored.is_deleted);
    assert!(stored.content.is_empty());

    // The row keeps its place so ordering and replies stay intact.
    let listed = service.list_messages(&room.id, None).await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|v| v.message.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    assert!(listed[0].message.is_deleted);

    // Deleting again is a no-op, not an error.
    let again = service.delete_message(&first.id, "bob").await.unwrap();
    assert!(again.is_deleted);

    // A deleted message cannot be edited back to life.
    let err = service.edit_message(&first.id, "bob", "undelete").await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidArgument { .. }), "got: {err}");
}

#[tokio::test]
async fn admins_may_delete_other_peoples_messages() {
    let fixture = Fixture::new();
    let room = fixture.seed_room_with_members(RoomKind::Group, "general", "alice", &["bob", "carol"]);
    let service = fixture.messages();

    let sent = service.send_message(&room.id, "bob", "oops").await.unwrap();

    // A plain member cannot...
    let err = service.delete_message(&sent.id, "carol").await.unwrap_err();
    assert!(matches!(err, ChatError::Forbidden { .. }), "got: {err}");

    // ...the room admin can.
    let deleted = service.delete_message(&sent.id, "alice").await.unwrap();
    assert!(deleted.is_deleted);
}
