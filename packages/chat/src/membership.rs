//! Participant management and room lifecycle: explicit creation, invites,
//! removal, role changes, and the cascading delete.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use huddle_entity::{Message, MessageType, Participant, ParticipantRole, Room, RoomKind};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::repository::{Repository, StoreGuard};

pub struct MembershipService {
    repo: Arc<dyn Repository>,
    guard: StoreGuard,
}

impl MembershipService {
    pub fn new(repo: Arc<dyn Repository>, config: &ChatConfig) -> Self {
        Self {
            repo,
            guard: StoreGuard::new(config),
        }
    }

    /// Explicit creation call for group, project and general rooms. Direct
    /// rooms only come from the resolver. The creator becomes the room's
    /// first admin.
    pub async fn create_room(
        &self,
        name: &str,
        description: Option<&str>,
        kind: RoomKind,
        project_ref: Option<&str>,
        creator: &str,
    ) -> Result<Room> {
        if creator.is_empty() {
            return Err(ChatError::not_authenticated("missing creator identity"));
        }
        if kind == RoomKind::Direct {
            return Err(ChatError::invalid_argument(
                "direct rooms are created through pair resolution",
            ));
        }
        if name.trim().is_empty() {
            return Err(ChatError::invalid_argument("room name is empty"));
        }
        match (kind, project_ref) {
            (RoomKind::Project, None) => {
                return Err(ChatError::invalid_argument("project rooms need a project_ref"));
            }
            (RoomKind::Project, Some(_)) => {}
            (_, Some(_)) => {
                return Err(ChatError::invalid_argument(
                    "project_ref is only valid on project rooms",
                ));
            }
            (_, None) => {}
        }

        let now = Utc::now();
        let mut room = Room::new(
            Uuid::new_v4().to_string(),
            name.trim().to_string(),
            kind,
            creator.to_string(),
            now,
        );
        room.description = description.map(|d| d.to_string());
        room.project_ref = project_ref.map(|p| p.to_string());

        let created = self
            .guard
            .run("room.insert", || self.repo.insert_room(&room))
            .await?;
        let admin = Participant::new(
            created.id.clone(),
            creator.to_string(),
            ParticipantRole::Admin,
            now,
        );
        self.guard
            .run("participant.insert", || self.repo.insert_participant(&admin))
            .await?;

        info!(room_id = %created.id, kind = %kind, "created room");
        Ok(created)
    }

    /// Add a user to a room. Admin-only; inviting someone who already
    /// participates is a conflict. Announces the invite with a system
    /// message.
    pub async fn invite(
        &self,
        room_id: &str,
        target_user_id: &str,
        role: ParticipantRole,
        requester_id: &str,
    ) -> Result<Participant> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        self.require_admin(room_id, requester_id).await?;

        let existing = self
            .guard
            .run("participant.get", || {
                self.repo.participant(room_id, target_user_id)
            })
            .await?;
        if existing.is_some() {
            return Err(ChatError::conflict("user is already a participant"));
        }

        let participant = Participant::new(
            room_id.to_string(),
            target_user_id.to_string(),
            role,
            Utc::now(),
        );
        let created = match self
            .guard
            .run("participant.insert", || {
                self.repo.insert_participant(&participant)
            })
            .await
        {
            Ok(created) => created,
            // Two admins inviting the same user at once; the row exists,
            // which is what "already invited" means to the caller.
            Err(ChatError::Conflict { .. }) => {
                return Err(ChatError::conflict("user is already a participant"));
            }
            Err(other) => return Err(other),
        };

        // The announcement is best-effort: the invite itself already
        // happened and must not be rolled back over a missing banner.
        let announcement = Message::new(
            Uuid::new_v4().to_string(),
            room_id.to_string(),
            requester_id.to_string(),
            format!("{} was added to the room", target_user_id),
            MessageType::System,
            Utc::now(),
        );
        if let Err(err) = self
            .guard
            .run("message.insert", || self.repo.insert_message(&announcement))
            .await
        {
            warn!(room_id, error = %err, "invite announcement not recorded");
        }

        info!(room_id, user_id = target_user_id, "participant invited");
        Ok(created)
    }

    /// Remove a participant. Admins may remove anyone; everyone may remove
    /// themself (leave). Removal cascades nothing.
    pub async fn remove(
        &self,
        room_id: &str,
        target_user_id: &str,
        requester_id: &str,
    ) -> Result<()> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        if requester_id != target_user_id {
            self.require_admin(room_id, requester_id).await?;
        }

        let existing = self
            .guard
            .run("participant.get", || {
                self.repo.participant(room_id, target_user_id)
            })
            .await?;
        if existing.is_none() {
            return Err(ChatError::invalid_argument(
                "user is not a participant of this room",
            ));
        }

        self.guard
            .run("participant.delete", || {
                self.repo.delete_participant(room_id, target_user_id)
            })
            .await?;
        info!(room_id, user_id = target_user_id, "participant removed");
        Ok(())
    }

    /// Rename a room or replace its description. Admin-only; `kind`,
    /// `project_ref` and the creator are immutable.
    pub async fn update_room_info(
        &self,
        room_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        requester_id: &str,
    ) -> Result<Room> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        self.require_admin(room_id, requester_id).await?;

        let Some(mut room) = self.guard.run("room.get", || self.repo.room(room_id)).await? else {
            return Err(ChatError::invalid_argument("unknown room"));
        };
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(ChatError::invalid_argument("room name is empty"));
            }
            room.name = name.trim().to_string();
        }
        if let Some(description) = description {
            room.description = Some(description.to_string());
        }
        room.updated_at = Utc::now();

        self.guard
            .run("room.update", || self.repo.update_room(&room))
            .await
    }

    /// Change a participant's role. Admin-only.
    pub async fn set_role(
        &self,
        room_id: &str,
        target_user_id: &str,
        role: ParticipantRole,
        requester_id: &str,
    ) -> Result<Participant> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        self.require_admin(room_id, requester_id).await?;

        let Some(mut participant) = self
            .guard
            .run("participant.get", || {
                self.repo.participant(room_id, target_user_id)
            })
            .await?
        else {
            return Err(ChatError::invalid_argument(
                "user is not a participant of this room",
            ));
        };

        participant.role = role;
        self.guard
            .run("participant.update", || {
                self.repo.update_participant(&participant)
            })
            .await
    }

    /// Destroy a room and everything in it: messages, then participants,
    /// then the room row. Admin-only.
    ///
    /// The delete is verified afterwards: a room that still resolves after a
    /// reported-successful delete means some layer below silently refused,
    /// and that is an integrity fault, not a success.
    pub async fn delete_room(&self, room_id: &str, requester_id: &str) -> Result<()> {
        if requester_id.is_empty() {
            return Err(ChatError::not_authenticated("missing requester identity"));
        }
        self.require_admin(room_id, requester_id).await?;

        self.guard
            .run("message.delete_room", || {
                self.repo.delete_room_messages(room_id)
            })
            .await?;
        self.guard
            .run("participant.delete_room", || {
                self.repo.delete_room_participants(room_id)
            })
            .await?;
        self.guard
            .run("room.delete", || self.repo.delete_room(room_id))
            .await?;

        let survivor = self.guard.run("room.get", || self.repo.room(room_id)).await?;
        if survivor.is_some() {
            error!(room_id, "room still exists after delete");
            return Err(ChatError::fatal("room still exists after delete"));
        }

        info!(room_id, "room deleted");
        Ok(())
    }

    async fn require_admin(&self, room_id: &str, user_id: &str) -> Result<Participant> {
        let Some(participant) = self
            .guard
            .run("participant.get", || self.repo.participant(room_id, user_id))
            .await?
        else {
            return Err(ChatError::forbidden("not a participant of this room"));
        };
        if !participant.is_admin() {
            return Err(ChatError::forbidden("requires room admin"));
        }
        Ok(participant)
    }
}
