use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ParseEnumError;

/// Conversation kinds supported by the chat core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// One-to-one conversation; exactly two participants, deduplicated per pair
    Direct,
    /// Ad-hoc multi-user conversation
    Group,
    /// Conversation attached to a project
    Project,
    /// Organization-wide broadcast conversation
    General,
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKind::Direct => write!(f, "direct"),
            RoomKind::Group => write!(f, "group"),
            RoomKind::Project => write!(f, "project"),
            RoomKind::General => write!(f, "general"),
        }
    }
}

impl std::str::FromStr for RoomKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(RoomKind::Direct),
            "group" => Ok(RoomKind::Group),
            "project" => Ok(RoomKind::Project),
            "general" => Ok(RoomKind::General),
            other => Err(ParseEnumError { kind: "room kind", value: other.to_string() }),
        }
    }
}

/// A named conversation context containing participants and messages.
///
/// `kind` is immutable after creation. Direct rooms additionally carry a
/// `direct_key` so the store can hold a unique index over the unordered
/// participant pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub kind: RoomKind,

    /// Project this room belongs to; only meaningful when `kind` is `project`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,

    /// Canonical `min(a,b):max(a,b)` pair key, set only for direct rooms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_key: Option<String>,

    pub created_by: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(
        id: String,
        name: String,
        kind: RoomKind,
        created_by: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description: None,
            kind,
            project_ref: None,
            direct_key: None,
            created_by,
            created_at,
            updated_at: created_at,
        }
    }

    /// Canonicalize an unordered user pair into the stored key form.
    pub fn direct_key_for(user_a: &str, user_b: &str) -> String {
        if user_a <= user_b {
            format!("{}:{}", user_a, user_b)
        } else {
            format!("{}:{}", user_b, user_a)
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == RoomKind::Direct
    }
}
