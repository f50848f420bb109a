use serde::{Deserialize, Serialize};

/// Minimal profile data used to annotate senders and directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    pub display_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(id: String, display_name: String) -> Self {
        Self { id, display_name, avatar_url: None }
    }
}
