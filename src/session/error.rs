//! Session operation error types.

use thiserror::Error;

use crate::player::ProcessError;

/// Errors returned by session operations. IPC unreachability is not here:
/// it degrades to absent values and is cross-checked by the watchdog.
#[derive(Debug, Error)]
pub enum ControllerError {
  #[error("File not found")]
  NotFound,

  #[error("Path not allowed")]
  PathDenied,

  #[error("Unsupported file type")]
  UnknownType,

  #[error("Stream resolution failed: {0}")]
  Resolve(String),

  #[error("Renderer launch failed: {0}")]
  Spawn(#[from] ProcessError),

  #[error("No active playback")]
  NoActivePlayback,
}
