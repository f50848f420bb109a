//! Idempotent resolution of one-to-one rooms.
//!
//! The dedup guarantee has two layers: a sharded in-process mutex serializes
//! resolution per unordered pair, and the store's unique `direct_key` index
//! catches racers this process cannot see. Either layer alone closes the
//! common race; together they also cover multi-node deployments.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use huddle_entity::{Participant, ParticipantRole, Room, RoomKind};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::repository::{Repository, StoreGuard};

struct PairLocks {
    shards: Vec<Mutex<()>>,
}

impl PairLocks {
    fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }
}

pub struct RoomResolver {
    repo: Arc<dyn Repository>,
    guard: StoreGuard,
    locks: PairLocks,
}

impl RoomResolver {
    pub fn new(repo: Arc<dyn Repository>, config: &ChatConfig) -> Self {
        Self {
            repo,
            guard: StoreGuard::new(config),
            locks: PairLocks::new(config.pair_lock_shards),
        }
    }

    /// Find or create the single direct room for `user_a` and `user_b`.
    ///
    /// The caller must be one of the two users. At most one room-creation and
    /// two participant-creation writes happen, ever, per pair.
    pub async fn resolve(&self, caller: &str, user_a: &str, user_b: &str) -> Result<Room> {
        if caller.is_empty() {
            return Err(ChatError::not_authenticated("missing caller identity"));
        }
        if user_a == user_b {
            return Err(ChatError::invalid_argument(
                "cannot open a direct room with yourself",
            ));
        }
        if caller != user_a && caller != user_b {
            return Err(ChatError::not_authenticated("caller is not part of the pair"));
        }

        let key = Room::direct_key_for(user_a, user_b);
        let _serialized = self.locks.shard(&key).lock().await;

        if let Some(existing) = self.find_existing(&key, user_a, user_b).await? {
            return Ok(existing);
        }
        self.create(caller, user_a, user_b, &key).await
    }

    async fn find_existing(
        &self,
        key: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<Room>> {
        let mut rooms = self
            .guard
            .run("room.direct_pair", || {
                self.repo.direct_rooms_for_pair(user_a, user_b)
            })
            .await?;
        rooms.sort_by(|l, r| l.created_at.cmp(&r.created_at).then_with(|| l.id.cmp(&r.id)));
        if rooms.len() > 1 {
            // Dedup invariant already violated in the store. Pick the
            // earliest-created room so both users keep one working
            // conversation; the fault itself needs an operator.
            error!(
                direct_key = key,
                count = rooms.len(),
                kept = %rooms[0].id,
                "duplicate direct rooms for one pair; returning earliest-created"
            );
        }
        Ok(rooms.into_iter().next())
    }

    async fn create(
        &self,
        caller: &str,
        user_a: &str,
        user_b: &str,
        key: &str,
    ) -> Result<Room> {
        let now = Utc::now();
        let counterpart_id = if caller == user_a { user_b } else { user_a };

        // Direct rooms have no name of their own; clients render the
        // counterpart's display name.
        let mut room = Room::new(
            Uuid::new_v4().to_string(),
            String::new(),
            RoomKind::Direct,
            caller.to_string(),
            now,
        );
        room.direct_key = Some(key.to_string());

        let created = match self.guard.run("room.insert", || self.repo.insert_room(&room)).await {
            Ok(created) => created,
            Err(ChatError::Conflict { .. }) => {
                // Lost the cross-process race. Look the winner up by pair
                // key, not through participants: the winner may still be
                // writing its participant rows.
                debug!(direct_key = key, "direct room insert lost a race, returning winner");
                return match self
                    .guard
                    .run("room.by_direct_key", || self.repo.direct_room_by_key(key))
                    .await?
                {
                    Some(winner) => Ok(winner),
                    None => Err(ChatError::fatal(
                        "direct room insert conflicted but no room exists for the pair",
                    )),
                };
            }
            Err(other) => return Err(other),
        };

        let creator = Participant::new(
            created.id.clone(),
            caller.to_string(),
            ParticipantRole::Admin,
            now,
        );
        let counterpart = Participant::new(
            created.id.clone(),
            counterpart_id.to_string(),
            ParticipantRole::Member,
            now,
        );
        self.guard
            .run("participant.insert", || self.repo.insert_participant(&creator))
            .await?;
        self.guard
            .run("participant.insert", || {
                self.repo.insert_participant(&counterpart)
            })
            .await?;

        info!(room_id = %created.id, "created direct room");
        Ok(created)
    }
}
