//! Playback session: state machine, watchdog and observer events.

mod error;
mod manager;
mod types;
mod watchdog;

pub use error::ControllerError;
pub use manager::{PlayStarted, SessionManager};
pub use types::{ControllerEvent, MediaKind, StatusPayload, StatusSnapshot};
