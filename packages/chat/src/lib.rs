#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
// Allow unwrap/expect in test code for convenience
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Chat core: direct-room resolution, room directory with unread counts,
//! message access, membership management, and realtime invalidation fan-out.
//!
//! Durable storage, identity, profile and project lookup are injected
//! collaborators (see [`repository`]); this crate owns the domain rules.

pub mod config;
pub mod directory;
pub mod error;
pub mod membership;
pub mod messages;
pub mod repository;
pub mod resolver;
pub mod sync;

pub use config::ChatConfig;
pub use directory::RoomDirectory;
pub use error::{ChatError, RepositoryError, Result};
pub use membership::MembershipService;
pub use messages::MessageService;
pub use repository::{ChangeStream, ProfileProvider, ProjectProvider, Repository, StoreGuard};
pub use resolver::RoomResolver;
pub use sync::{Invalidation, SessionHandle, SyncController, SyncDriver, Topic};
