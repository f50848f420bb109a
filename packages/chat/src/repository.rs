//! Injected collaborators: the durable store, the profile service, and the
//! project catalog.
//!
//! The store owns persistence and the change feed; everything above it is
//! domain logic. Feed filtering is client-side: `subscribe` returns the whole
//! feed and the sync controller picks out what its topics need.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::warn;

use huddle_entity::{ChangeEvent, Message, Participant, Room, UserProfile};

use crate::config::ChatConfig;
use crate::error::{ChatError, RepositoryError};

/// The store's change feed. Ends when the underlying connection drops; the
/// sync controller resubscribes and refreshes.
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

/// Durable store for rooms, participants and messages.
///
/// Plain CRUD plus the filtered queries the services need; no domain rules.
/// Every write must be observable on the stream handed out by [`subscribe`],
/// that feed is the realtime notification path.
///
/// [`subscribe`]: Repository::subscribe
#[async_trait]
pub trait Repository: Send + Sync {
    // --- rooms ---

    /// Insert a room. Must reject a duplicate `direct_key` with
    /// [`RepositoryError::Conflict`]; that unique index is the store-level
    /// half of the direct-room dedup guarantee.
    async fn insert_room(&self, room: &Room) -> Result<Room, RepositoryError>;

    async fn room(&self, room_id: &str) -> Result<Option<Room>, RepositoryError>;

    async fn update_room(&self, room: &Room) -> Result<Room, RepositoryError>;

    async fn delete_room(&self, room_id: &str) -> Result<(), RepositoryError>;

    /// Rooms the user currently participates in, newest first.
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>, RepositoryError>;

    /// Direct rooms that contain both users.
    async fn direct_rooms_for_pair(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Room>, RepositoryError>;

    /// The direct room carrying this canonical pair key, if any. Unlike
    /// [`direct_rooms_for_pair`] this does not depend on participant rows,
    /// so it also finds a room whose participants are still being written.
    ///
    /// [`direct_rooms_for_pair`]: Repository::direct_rooms_for_pair
    async fn direct_room_by_key(
        &self,
        direct_key: &str,
    ) -> Result<Option<Room>, RepositoryError>;

    // --- participants ---

    /// Insert a participant row; duplicate `(room_id, user_id)` is a
    /// [`RepositoryError::Conflict`].
    async fn insert_participant(
        &self,
        participant: &Participant,
    ) -> Result<Participant, RepositoryError>;

    async fn participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, RepositoryError>;

    async fn update_participant(
        &self,
        participant: &Participant,
    ) -> Result<Participant, RepositoryError>;

    async fn delete_participant(&self, room_id: &str, user_id: &str)
        -> Result<(), RepositoryError>;

    async fn participants_for_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<Participant>, RepositoryError>;

    async fn participants_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Participant>, RepositoryError>;

    async fn delete_room_participants(&self, room_id: &str) -> Result<(), RepositoryError>;

    // --- messages ---

    async fn insert_message(&self, message: &Message) -> Result<Message, RepositoryError>;

    async fn message(&self, message_id: &str) -> Result<Option<Message>, RepositoryError>;

    async fn update_message(&self, message: &Message) -> Result<Message, RepositoryError>;

    /// Up to `limit` messages of a room, `created_at` ascending with id
    /// tie-break.
    async fn messages_for_room(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Count of non-deleted messages in the room authored by someone other
    /// than `user_id` and created strictly after `since` (all of them when
    /// `since` is `None`).
    async fn unread_count(
        &self,
        room_id: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64, RepositoryError>;

    async fn delete_room_messages(&self, room_id: &str) -> Result<(), RepositoryError>;

    // --- change feed ---

    /// Open the store's change feed. Implementations emit one [`ChangeEvent`]
    /// per committed write; ordering across entity types is not guaranteed
    /// and duplicates are allowed.
    async fn subscribe(&self) -> Result<ChangeStream, RepositoryError>;
}

/// Batch profile lookup for annotating senders and directories.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Unknown ids are absent from the result, not an error.
    async fn profiles(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, UserProfile>, RepositoryError>;
}

/// Batch project-name lookup for project rooms.
#[async_trait]
pub trait ProjectProvider: Send + Sync {
    async fn project_names(
        &self,
        project_refs: &[String],
    ) -> Result<HashMap<String, String>, RepositoryError>;
}

/// Applies the resource rules to every store call: a hard timeout per
/// attempt, and bounded retry with jittered exponential backoff for
/// transient failures. Non-transient errors surface on the first attempt.
#[derive(Debug, Clone)]
pub struct StoreGuard {
    timeout: Duration,
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl StoreGuard {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            timeout: config.store_timeout,
            attempts: config.store_attempts.max(1),
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Run `call`, retrying transient failures. `operation` labels log lines.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ChatError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => RepositoryError::unavailable(format!("{} timed out", operation)),
            };
            if !failure.is_retryable() || attempt >= self.attempts {
                return Err(failure.into());
            }
            let delay = self.backoff_delay(attempt);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "store call failed, retrying"
            );
            sleep(delay).await;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay);
        // spread retries out so callers that failed together do not retry together
        let jitter_ceiling = (capped.as_millis() as u64 / 4).max(1);
        let jitter = rand::rng().random_range(0..=jitter_ceiling);
        capped + Duration::from_millis(jitter)
    }
}
