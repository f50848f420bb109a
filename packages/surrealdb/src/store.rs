//! The `Repository` implementation.
//!
//! Record keys carry the uniqueness rules: a direct room's record key is its
//! canonical pair key, a participant's is `room_id:user_id`, so the store
//! rejects duplicates without a read-modify-write cycle. Domain ids stay in
//! plain fields (`room_id`, `message_id`) and every query filters on those.
//! Timestamps are stored as epoch milliseconds; RFC 3339 strings do not sort
//! reliably once subsecond precision varies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::{Action, Notification, Surreal};
use tracing::warn;

use huddle_chat::repository::{ChangeStream, Repository};
use huddle_chat::RepositoryError;
use huddle_entity::{
    ChangeEntity, ChangeEvent, ChangeOperation, Message, MessageType, Participant,
    ParticipantRole, Room, RoomKind,
};

use crate::schema;

#[derive(Clone)]
pub struct SurrealRepository {
    db: Surreal<Any>,
}

impl SurrealRepository {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Connect to `address` (e.g. `mem://`, `surrealkv://path`, `ws://host`),
    /// select namespace/database, and apply the schema.
    pub async fn connect(
        address: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, RepositoryError> {
        let db = surrealdb::engine::any::connect(address)
            .await
            .map_err(|e| classify(e, "connect"))?;
        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| classify(e, "use_ns"))?;
        schema::define(&db).await?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}

/// Classify a driver error the way the services expect: conflicts are
/// recoverable, connection trouble is retryable, the rest is a query bug or
/// backend fault. The driver exposes no error codes here, only text.
fn classify(err: surrealdb::Error, operation: &'static str) -> RepositoryError {
    let text = err.to_string();
    if text.contains("already exists") || text.contains("already contains") {
        RepositoryError::conflict(text)
    } else if text.contains("connection") || text.contains("connect") || text.contains("timeout") {
        RepositoryError::unavailable(text)
    } else {
        RepositoryError::backend(text, operation)
    }
}

fn timestamp(ms: i64, field: &'static str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| RepositoryError::data(format!("{} out of range: {}", field, ms)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoomRow {
    room_id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    kind: RoomKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    direct_key: Option<String>,
    created_by: String,
    created_at: i64,
    updated_at: i64,
}

impl RoomRow {
    fn from_entity(room: &Room) -> Self {
        Self {
            room_id: room.id.clone(),
            name: room.name.clone(),
            description: room.description.clone(),
            kind: room.kind,
            project_ref: room.project_ref.clone(),
            direct_key: room.direct_key.clone(),
            created_by: room.created_by.clone(),
            created_at: room.created_at.timestamp_millis(),
            updated_at: room.updated_at.timestamp_millis(),
        }
    }

    fn into_entity(self) -> Result<Room, RepositoryError> {
        Ok(Room {
            id: self.room_id,
            name: self.name,
            description: self.description,
            kind: self.kind,
            project_ref: self.project_ref,
            direct_key: self.direct_key,
            created_by: self.created_by,
            created_at: timestamp(self.created_at, "room.created_at")?,
            updated_at: timestamp(self.updated_at, "room.updated_at")?,
        })
    }

    /// Direct rooms are keyed by their pair key so a second insert for the
    /// same pair collides on the record itself.
    fn record_key(&self) -> String {
        self.direct_key.clone().unwrap_or_else(|| self.room_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParticipantRow {
    room_id: String,
    user_id: String,
    role: ParticipantRole,
    joined_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_read_at: Option<i64>,
}

impl ParticipantRow {
    fn from_entity(participant: &Participant) -> Self {
        Self {
            room_id: participant.room_id.clone(),
            user_id: participant.user_id.clone(),
            role: participant.role,
            joined_at: participant.joined_at.timestamp_millis(),
            last_read_at: participant.last_read_at.map(|t| t.timestamp_millis()),
        }
    }

    fn into_entity(self) -> Result<Participant, RepositoryError> {
        let last_read_at = match self.last_read_at {
            Some(ms) => Some(timestamp(ms, "participant.last_read_at")?),
            None => None,
        };
        Ok(Participant {
            room_id: self.room_id,
            user_id: self.user_id,
            role: self.role,
            joined_at: timestamp(self.joined_at, "participant.joined_at")?,
            last_read_at,
        })
    }
}

fn participant_key(room_id: &str, user_id: &str) -> String {
    format!("{}:{}", room_id, user_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageRow {
    message_id: String,
    room_id: String,
    sender_id: String,
    content: String,
    message_type: MessageType,
    is_edited: bool,
    is_deleted: bool,
    created_at: i64,
    updated_at: i64,
}

impl MessageRow {
    fn from_entity(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            room_id: message.room_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            is_edited: message.is_edited,
            is_deleted: message.is_deleted,
            created_at: message.created_at.timestamp_millis(),
            updated_at: message.updated_at.timestamp_millis(),
        }
    }

    fn into_entity(self) -> Result<Message, RepositoryError> {
        Ok(Message {
            id: self.message_id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            content: self.content,
            message_type: self.message_type,
            is_edited: self.is_edited,
            is_deleted: self.is_deleted,
            created_at: timestamp(self.created_at, "message.created_at")?,
            updated_at: timestamp(self.updated_at, "message.updated_at")?,
        })
    }
}

fn operation_for(action: &Action) -> ChangeOperation {
    match action {
        Action::Create => ChangeOperation::Create,
        Action::Update => ChangeOperation::Update,
        Action::Delete => ChangeOperation::Delete,
        _ => ChangeOperation::Update,
    }
}

fn room_event(item: surrealdb::Result<Notification<RoomRow>>) -> Option<ChangeEvent> {
    match item {
        Ok(n) => Some(ChangeEvent::new(
            ChangeEntity::Room,
            operation_for(&n.action),
            n.data.room_id,
        )),
        Err(err) => {
            warn!(error = %err, "room live query notification dropped");
            None
        }
    }
}

fn participant_event(item: surrealdb::Result<Notification<ParticipantRow>>) -> Option<ChangeEvent> {
    match item {
        Ok(n) => Some(ChangeEvent::new(
            ChangeEntity::Participant,
            operation_for(&n.action),
            n.data.room_id,
        )),
        Err(err) => {
            warn!(error = %err, "participant live query notification dropped");
            None
        }
    }
}

fn message_event(item: surrealdb::Result<Notification<MessageRow>>) -> Option<ChangeEvent> {
    match item {
        Ok(n) => Some(ChangeEvent::new(
            ChangeEntity::Message,
            operation_for(&n.action),
            n.data.room_id,
        )),
        Err(err) => {
            warn!(error = %err, "message live query notification dropped");
            None
        }
    }
}

#[async_trait]
impl Repository for SurrealRepository {
    async fn insert_room(&self, room: &Room) -> Result<Room, RepositoryError> {
        let row = RoomRow::from_entity(room);
        let key = row.record_key();
        let created: Option<RoomRow> = self
            .db
            .create(("room", key))
            .content(row)
            .await
            .map_err(|e| classify(e, "room.insert"))?;
        created
            .ok_or_else(|| RepositoryError::backend("room insert returned nothing", "room.insert"))?
            .into_entity()
    }

    async fn room(&self, room_id: &str) -> Result<Option<Room>, RepositoryError> {
        let mut response = self
            .db
            .query("SELECT * FROM room WHERE room_id = $room_id LIMIT 1")
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| classify(e, "room.get"))?;
        let rows: Vec<RoomRow> = response.take(0).map_err(|e| classify(e, "room.get"))?;
        rows.into_iter().next().map(RoomRow::into_entity).transpose()
    }

    async fn update_room(&self, room: &Room) -> Result<Room, RepositoryError> {
        let row = RoomRow::from_entity(room);
        let key = row.record_key();
        let updated: Option<RoomRow> = self
            .db
            .update(("room", key))
            .content(row)
            .await
            .map_err(|e| classify(e, "room.update"))?;
        updated
            .ok_or_else(|| RepositoryError::backend("room no longer exists", "room.update"))?
            .into_entity()
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), RepositoryError> {
        self.db
            .query("DELETE room WHERE room_id = $room_id")
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| classify(e, "room.delete"))?
            .check()
            .map_err(|e| classify(e, "room.delete"))?;
        Ok(())
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>, RepositoryError> {
        let query = "
            SELECT * FROM room
            WHERE room_id IN (SELECT VALUE room_id FROM participant WHERE user_id = $user_id)
            ORDER BY created_at DESC
        ";
        let mut response = self
            .db
            .query(query)
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(|e| classify(e, "room.for_user"))?;
        let rows: Vec<RoomRow> = response.take(0).map_err(|e| classify(e, "room.for_user"))?;
        rows.into_iter().map(RoomRow::into_entity).collect()
    }

    async fn direct_rooms_for_pair(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Room>, RepositoryError> {
        let query = "
            SELECT * FROM room
            WHERE kind = 'direct'
            AND room_id IN (SELECT VALUE room_id FROM participant WHERE user_id = $user_a)
            AND room_id IN (SELECT VALUE room_id FROM participant WHERE user_id = $user_b)
            ORDER BY created_at ASC
        ";
        let mut response = self
            .db
            .query(query)
            .bind(("user_a", user_a.to_string()))
            .bind(("user_b", user_b.to_string()))
            .await
            .map_err(|e| classify(e, "room.direct_pair"))?;
        let rows: Vec<RoomRow> =
            response.take(0).map_err(|e| classify(e, "room.direct_pair"))?;
        rows.into_iter().map(RoomRow::into_entity).collect()
    }

    async fn direct_room_by_key(
        &self,
        direct_key: &str,
    ) -> Result<Option<Room>, RepositoryError> {
        // Direct rooms are keyed by their pair key, so this is a record read.
        let row: Option<RoomRow> = self
            .db
            .select(("room", direct_key))
            .await
            .map_err(|e| classify(e, "room.by_direct_key"))?;
        row.map(RoomRow::into_entity).transpose()
    }

    async fn insert_participant(
        &self,
        participant: &Participant,
    ) -> Result<Participant, RepositoryError> {
        let row = ParticipantRow::from_entity(participant);
        let key = participant_key(&row.room_id, &row.user_id);
        let created: Option<ParticipantRow> = self
            .db
            .create(("participant", key))
            .content(row)
            .await
            .map_err(|e| classify(e, "participant.insert"))?;
        created
            .ok_or_else(|| {
                RepositoryError::backend("participant insert returned nothing", "participant.insert")
            })?
            .into_entity()
    }

    async fn participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, RepositoryError> {
        let row: Option<ParticipantRow> = self
            .db
            .select(("participant", participant_key(room_id, user_id)))
            .await
            .map_err(|e| classify(e, "participant.get"))?;
        row.map(ParticipantRow::into_entity).transpose()
    }

    async fn update_participant(
        &self,
        participant: &Participant,
    ) -> Result<Participant, RepositoryError> {
        let row = ParticipantRow::from_entity(participant);
        let key = participant_key(&row.room_id, &row.user_id);
        let updated: Option<ParticipantRow> = self
            .db
            .update(("participant", key))
            .content(row)
            .await
            .map_err(|e| classify(e, "participant.update"))?;
        updated
            .ok_or_else(|| {
                RepositoryError::backend("participant no longer exists", "participant.update")
            })?
            .into_entity()
    }

    async fn delete_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        let _: Option<ParticipantRow> = self
            .db
            .delete(("participant", participant_key(room_id, user_id)))
            .await
            .map_err(|e| classify(e, "participant.delete"))?;
        Ok(())
    }

    async fn participants_for_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let mut response = self
            .db
            .query("SELECT * FROM participant WHERE room_id = $room_id")
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| classify(e, "participant.for_room"))?;
        let rows: Vec<ParticipantRow> =
            response.take(0).map_err(|e| classify(e, "participant.for_room"))?;
        rows.into_iter().map(ParticipantRow::into_entity).collect()
    }

    async fn participants_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let mut response = self
            .db
            .query("SELECT * FROM participant WHERE user_id = $user_id")
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(|e| classify(e, "participant.for_user"))?;
        let rows: Vec<ParticipantRow> =
            response.take(0).map_err(|e| classify(e, "participant.for_user"))?;
        rows.into_iter().map(ParticipantRow::into_entity).collect()
    }

    async fn delete_room_participants(&self, room_id: &str) -> Result<(), RepositoryError> {
        self.db
            .query("DELETE participant WHERE room_id = $room_id")
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| classify(e, "participant.delete_room"))?
            .check()
            .map_err(|e| classify(e, "participant.delete_room"))?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<Message, RepositoryError> {
        let row = MessageRow::from_entity(message);
        let key = row.message_id.clone();
        let created: Option<MessageRow> = self
            .db
            .create(("message", key))
            .content(row)
            .await
            .map_err(|e| classify(e, "message.insert"))?;
        created
            .ok_or_else(|| {
                RepositoryError::backend("message insert returned nothing", "message.insert")
            })?
            .into_entity()
    }

    async fn message(&self, message_id: &str) -> Result<Option<Message>, RepositoryError> {
        let row: Option<MessageRow> = self
            .db
            .select(("message", message_id))
            .await
            .map_err(|e| classify(e, "message.get"))?;
        row.map(MessageRow::into_entity).transpose()
    }

    async fn update_message(&self, message: &Message) -> Result<Message, RepositoryError> {
        let row = MessageRow::from_entity(message);
        let key = row.message_id.clone();
        let updated: Option<MessageRow> = self
            .db
            .update(("message", key))
            .content(row)
            .await
            .map_err(|e| classify(e, "message.update"))?;
        updated
            .ok_or_else(|| RepositoryError::backend("message no longer exists", "message.update"))?
            .into_entity()
    }

    async fn messages_for_room(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let query = format!(
            "SELECT * FROM message WHERE room_id = $room_id \
             ORDER BY created_at ASC, message_id ASC LIMIT {}",
            limit
        );
        let mut response = self
            .db
            .query(query)
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| classify(e, "message.list"))?;
        let rows: Vec<MessageRow> = response.take(0).map_err(|e| classify(e, "message.list"))?;
        rows.into_iter().map(MessageRow::into_entity).collect()
    }

    async fn unread_count(
        &self,
        room_id: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, RepositoryError> {
        let query = if since.is_some() {
            "SELECT count() FROM message \
             WHERE room_id = $room_id AND sender_id != $user_id \
             AND is_deleted = false AND created_at > $since \
             GROUP ALL"
        } else {
            "SELECT count() FROM message \
             WHERE room_id = $room_id AND sender_id != $user_id \
             AND is_deleted = false \
             GROUP ALL"
        };
        let mut request = self
            .db
            .query(query)
            .bind(("room_id", room_id.to_string()))
            .bind(("user_id", user_id.to_string()));
        if let Some(since) = since {
            request = request.bind(("since", since.timestamp_millis()));
        }
        let mut response = request.await.map_err(|e| classify(e, "message.unread_count"))?;
        let count: Option<i64> = response
            .take((0, "count"))
            .map_err(|e| classify(e, "message.unread_count"))?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn delete_room_messages(&self, room_id: &str) -> Result<(), RepositoryError> {
        self.db
            .query("DELETE message WHERE room_id = $room_id")
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| classify(e, "message.delete_room"))?
            .check()
            .map_err(|e| classify(e, "message.delete_room"))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeStream, RepositoryError> {
        let rooms = self
            .db
            .select::<Vec<RoomRow>>("room")
            .live()
            .await
            .map_err(|e| classify(e, "feed.room"))?;
        let participants = self
            .db
            .select::<Vec<ParticipantRow>>("participant")
            .live()
            .await
            .map_err(|e| classify(e, "feed.participant"))?;
        let messages = self
            .db
            .select::<Vec<MessageRow>>("message")
            .live()
            .await
            .map_err(|e| classify(e, "feed.message"))?;

        let rooms = rooms.filter_map(|item| async move { room_event(item) });
        let participants =
            participants.filter_map(|item| async move { participant_event(item) });
        let messages = messages.filter_map(|item| async move { message_event(item) });

        let merged = futures::stream::select_all(vec![
            rooms.boxed(),
            participants.boxed(),
            messages.boxed(),
        ]);
        Ok(merged.boxed())
    }
}
