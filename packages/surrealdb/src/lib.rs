#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
// Allow unwrap/expect in test code for convenience
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! SurrealDB implementation of the chat core's `Repository` trait.
//!
//! Rooms, participants and messages live in three schemaless tables; the
//! change feed is three LIVE queries merged into one stream. Direct-room
//! deduplication is enforced at this layer through the record key (the
//! canonical pair key), so a losing racer gets a conflict instead of a
//! second room.

pub mod schema;
pub mod store;

pub use store::SurrealRepository;
