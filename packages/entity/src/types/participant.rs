use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ParseEnumError;

/// Role a participant holds inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Moderator,
    Member,
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantRole::Admin => write!(f, "admin"),
            ParticipantRole::Moderator => write!(f, "moderator"),
            ParticipantRole::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(ParticipantRole::Admin),
            "moderator" => Ok(ParticipantRole::Moderator),
            "member" => Ok(ParticipantRole::Member),
            other => Err(ParseEnumError { kind: "participant role", value: other.to_string() }),
        }
    }
}

/// Membership relation between a user and a room.
///
/// `(room_id, user_id)` is the composite key; the pair is unique in the
/// store. `last_read_at` is the unread watermark and is moved only by the
/// owning user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: String,

    pub user_id: String,

    pub role: ParticipantRole,

    pub joined_at: DateTime<Utc>,

    /// Boundary between read and unread messages; absent until the first read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(
        room_id: String,
        user_id: String,
        role: ParticipantRole,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id,
            user_id,
            role,
            joined_at,
            last_read_at: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ParticipantRole::Admin
    }
}
