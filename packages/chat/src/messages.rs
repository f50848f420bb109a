//! Message access for a room: paged listing with sender profiles, append,
//! edit, and soft deletion.
//!
//! Every successful write lands on the store's change feed, which is how the
//! sync controller learns about it; there is no separate notify call here.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use huddle_entity::{Message, MessageType, MessageView, ParticipantRole};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::repository::{ProfileProvider, Repository, StoreGuard};

use uuid::Uuid;

pub struct MessageService {
    repo: Arc<dyn Repository>,
    profiles: Arc<dyn ProfileProvider>,
    guard: StoreGuard,
    default_limit: usize,
}

impl MessageService {
    pub fn new(
        repo: Arc<dyn Repository>,
        profiles: Arc<dyn ProfileProvider>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            repo,
            profiles,
            guard: StoreGuard::new(config),
            default_limit: config.default_message_limit,
        }
    }

    /// Up to `limit` messages (default 100), oldest first, each joined with
    /// its sender's profile through one batch lookup.
    ///
    /// The limit parameter is where cursor pagination would attach later; the
    /// ordering contract (`created_at` ascending, id tie-break) would not
    /// change with it.
    pub async fn list_messages(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MessageView>> {
        let limit = limit.unwrap_or(self.default_limit);
        let mut messages = self
            .guard
            .run("message.list", || self.repo.messages_for_room(room_id, limit))
            .await?;
        messages.sort_by(|l, r| l.ordering_cmp(r));

        let sender_ids: Vec<String> = messages
            .iter()
            .map(|m| m.sender_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let profiles = if sender_ids.is_empty() {
            Default::default()
        } else {
            self.guard
                .run("profiles.batch", || self.profiles.profiles(&sender_ids))
                .await?
        };

        Ok(messages
            .into_iter()
            .map(|message| {
                let sender = profiles.get(&message.sender_id).cloned();
                MessageView { message, sender }
            })
            .collect())
    }

    /// Append a text message. The sender must still be a participant, and the
    /// content must be non-blank. Timestamps are server-assigned.
    pub async fn send_message(
        &self,
        room_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message> {
        if sender_id.is_empty() {
            return Err(ChatError::not_authenticated("missing sender identity"));
        }
        if content.trim().is_empty() {
            return Err(ChatError::invalid_argument("message content is empty"));
        }
        let membership = self
            .guard
            .run("participant.get", || self.repo.participant(room_id, sender_id))
            .await?;
        if membership.is_none() {
            return Err(ChatError::forbidden("sender is not a participant of this room"));
        }

        let message = Message::new(
            Uuid::new_v4().to_string(),
            room_id.to_string(),
            sender_id.to_string(),
            content.to_string(),
            MessageType::Text,
            Utc::now(),
        );
        let created = self
            .guard
            .run("message.insert", || self.repo.insert_message(&message))
            .await?;
        debug!(room_id, message_id = %created.id, "message sent");
        Ok(created)
    }

    /// Replace a message's content. Author-only; marks the message edited.
    pub async fn edit_message(
        &self,
        message_id: &str,
        requester_id: &str,
        content: &str,
    ) -> Result<Message> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        if content.trim().is_empty() {
            return Err(ChatError::invalid_argument("message content is empty"));
        }
        let Some(mut message) = self
            .guard
            .run("message.get", || self.repo.message(message_id))
            .await?
        else {
            return Err(ChatError::invalid_argument("unknown message"));
        };
        if message.is_deleted {
            return Err(ChatError::invalid_argument("message was deleted"));
        }
        if message.sender_id != requester_id {
            return Err(ChatError::forbidden("only the author may edit a message"));
        }

        message.content = content.to_string();
        message.is_edited = true;
        message.updated_at = Utc::now();
        self.guard
            .run("message.update", || self.repo.update_message(&message))
            .await
    }

    /// Soft-delete a message: the row keeps its place in the timeline, the
    /// content is cleared. Allowed for the author and for room admins.
    /// Deleting an already-deleted message is a no-op.
    pub async fn delete_message(&self, message_id: &str, requester_id: &str) -> Result<Message> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        let Some(mut message) = self
            .guard
            .run("message.get", || self.repo.message(message_id))
            .await?
        else {
            return Err(ChatError::invalid_argument("unknown message"));
        };
        if message.is_deleted {
            return Ok(message);
        }

        if message.sender_id != requester_id {
            let requester = self
                .guard
                .run("participant.get", || {
                    self.repo.participant(&message.room_id, requester_id)
                })
                .await?;
            let is_admin = requester
                .map(|p| p.role == ParticipantRole::Admin)
                .unwrap_or(false);
            if !is_admin {
                return Err(ChatError::forbidden(
                    "only the author or a room admin may delete a message",
                ));
            }
        }

        message.redact(Utc::now());
        let updated = self
            .guard
            .run("message.update", || self.repo.update_message(&message))
            .await?;
        debug!(room_id = %updated.room_id, message_id, "message deleted");
        Ok(updated)
    }
}
