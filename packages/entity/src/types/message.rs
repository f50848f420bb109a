use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    File,
    Image,
    System,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::File => write!(f, "file"),
            MessageType::Image => write!(f, "image"),
            MessageType::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "file" => Ok(MessageType::File),
            "image" => Ok(MessageType::Image),
            "system" => Ok(MessageType::System),
            other => Err(ParseEnumError { kind: "message type", value: other.to_string() }),
        }
    }
}

/// A single message inside a room.
///
/// Immutable once created except for content edits (`is_edited`) and soft
/// deletion (`is_deleted`, content cleared). Canonical order within a room is
/// `created_at` ascending with `id` as tie-break; timestamps are
/// server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    pub room_id: String,

    pub sender_id: String,

    pub content: String,

    pub message_type: MessageType,

    pub is_edited: bool,

    pub is_deleted: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: String,
        room_id: String,
        sender_id: String,
        content: String,
        message_type: MessageType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            content,
            message_type,
            is_edited: false,
            is_deleted: false,
            created_at,
            updated_at: created_at,
        }
    }

    /// Soft-delete: the row survives for ordering and reply integrity, the
    /// content does not.
    pub fn redact(&mut self, at: DateTime<Utc>) {
        self.content.clear();
        self.is_deleted = true;
        self.updated_at = at;
    }

    /// Canonical within-room ordering key: `created_at`, then `id`.
    pub fn ordering_cmp(&self, other: &Message) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}
