use serde::{Deserialize, Serialize};

/// Entity type a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEntity {
    Room,
    Participant,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

/// One entry of the store's change feed.
///
/// Carries no payload beyond the affected room: consumers are expected to
/// re-query, so a duplicate or reordered event costs a refetch and nothing
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: ChangeEntity,
    pub operation: ChangeOperation,
    pub room_id: String,
}

impl ChangeEvent {
    pub fn new(entity: ChangeEntity, operation: ChangeOperation, room_id: String) -> Self {
        Self { entity, operation, room_id }
    }
}
