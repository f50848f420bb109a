use serde::{Deserialize, Serialize};

use crate::types::{Message, Room, UserProfile};

/// A room as the directory hands it to a client session: the row itself plus
/// the per-viewer unread count and, for project rooms, the resolved project
/// name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomOverview {
    pub room: Room,

    pub unread_count: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

/// A message joined with its sender's profile for display.
///
/// `sender` is absent when the profile service no longer knows the user
/// (deactivated accounts keep their messages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub message: Message,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserProfile>,
}
