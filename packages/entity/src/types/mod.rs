pub mod change_event;
pub mod message;
pub mod participant;
pub mod room;
pub mod user_profile;
pub mod views;

pub use change_event::*;
pub use message::*;
pub use participant::*;
pub use room::*;
pub use user_profile::*;
pub use views::*;

use thiserror::Error;

/// Error returned when parsing one of the string-backed enums fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
