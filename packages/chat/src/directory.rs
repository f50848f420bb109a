//! Per-user room listing: ordering, unread counts, project annotation, and
//! the read watermark.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use huddle_entity::{Participant, Room, RoomOverview};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::repository::{ProjectProvider, Repository, StoreGuard};

pub struct RoomDirectory {
    repo: Arc<dyn Repository>,
    projects: Arc<dyn ProjectProvider>,
    guard: StoreGuard,
}

impl RoomDirectory {
    pub fn new(
        repo: Arc<dyn Repository>,
        projects: Arc<dyn ProjectProvider>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            repo,
            projects,
            guard: StoreGuard::new(config),
        }
    }

    /// Every room the user participates in, newest first, annotated with the
    /// viewer's unread count and (for project rooms) the project name.
    ///
    /// Grouping by kind is a presentation concern and not done here. A user
    /// with no rooms gets an empty list, not an error.
    pub async fn list_rooms(&self, user_id: &str) -> Result<Vec<RoomOverview>> {
        if user_id.is_empty() {
            return Err(ChatError::not_authenticated("missing user id"));
        }

        let memberships = self
            .guard
            .run("participant.for_user", || {
                self.repo.participants_for_user(user_id)
            })
            .await?;
        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let mut rooms = self
            .guard
            .run("room.for_user", || self.repo.rooms_for_user(user_id))
            .await?;
        rooms.sort_by(|l, r| r.created_at.cmp(&l.created_at).then_with(|| r.id.cmp(&l.id)));

        let watermarks: HashMap<&str, Option<DateTime<Utc>>> = memberships
            .iter()
            .map(|p| (p.room_id.as_str(), p.last_read_at))
            .collect();

        // One batch lookup for every project name, not one per room.
        let project_refs: Vec<String> = rooms
            .iter()
            .filter_map(|r| r.project_ref.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let project_names = if project_refs.is_empty() {
            HashMap::new()
        } else {
            self.guard
                .run("projects.names", || self.projects.project_names(&project_refs))
                .await?
        };

        let mut overviews = Vec::with_capacity(rooms.len());
        for room in rooms {
            let since = watermarks.get(room.id.as_str()).copied().flatten();
            let unread_count = self
                .guard
                .run("message.unread_count", || {
                    self.repo.unread_count(&room.id, user_id, since)
                })
                .await?;
            let project_name = room
                .project_ref
                .as_ref()
                .and_then(|r| project_names.get(r).cloned());
            overviews.push(RoomOverview { room, unread_count, project_name });
        }

        debug!(user_id, rooms = overviews.len(), "listed rooms");
        Ok(overviews)
    }

    /// Resolve one room for a viewer. Absent rooms are `Ok(None)`; an
    /// existing room the viewer does not participate in is `Forbidden`.
    pub async fn room(&self, room_id: &str, caller: &str) -> Result<Option<Room>> {
        if caller.is_empty() {
            return Err(ChatError::not_authenticated("missing user id"));
        }
        let Some(room) = self.guard.run("room.get", || self.repo.room(room_id)).await? else {
            return Ok(None);
        };
        let membership = self
            .guard
            .run("participant.get", || self.repo.participant(room_id, caller))
            .await?;
        if membership.is_none() {
            return Err(ChatError::forbidden("not a participant of this room"));
        }
        Ok(Some(room))
    }

    /// Advance the caller's own read watermark to now. Only the owning user
    /// moves it; there is no way to mark a room read for someone else.
    pub async fn mark_read(&self, room_id: &str, user_id: &str) -> Result<Participant> {
        if user_id.is_empty() {
            return Err(ChatError::not_authenticated("missing user id"));
        }
        let Some(mut participant) = self
            .guard
            .run("participant.get", || self.repo.participant(room_id, user_id))
            .await?
        else {
            return Err(ChatError::forbidden("not a participant of this room"));
        };

        participant.last_read_at = Some(Utc::now());
        let updated = self
            .guard
            .run("participant.update", || {
                self.repo.update_participant(&participant)
            })
            .await?;
        Ok(updated)
    }
}
