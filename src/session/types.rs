//! Playback session state and observer-facing payloads.

use std::path::Path;

use serde::Serialize;

const VIDEO_EXTENSIONS: &[&str] = &[
  "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpeg", "mpg", "3gp",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "opus"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

/// Kind of the active media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
  Video,
  Audio,
  Image,
  Stream,
  Monitor,
}

impl MediaKind {
  /// Classify a local file by extension. Only file-backed kinds are
  /// classifiable; stream and monitor are assigned by their operations.
  pub fn classify(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Audio)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
      Some(MediaKind::Image)
    } else {
      None
    }
  }

  /// Whether this kind is backed by the renderer's IPC channel.
  /// Images are rendered by the same process but never queried.
  pub fn is_ipc_capable(self) -> bool {
    matches!(
      self,
      MediaKind::Video | MediaKind::Audio | MediaKind::Stream | MediaKind::Monitor
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      MediaKind::Video => "video",
      MediaKind::Audio => "audio",
      MediaKind::Image => "image",
      MediaKind::Stream => "stream",
      MediaKind::Monitor => "monitor",
    }
  }
}

/// Session flags, guarded by one `RwLock`. Process handles live in the
/// supervisor; this struct holds only identity and mode.
#[derive(Debug, Default)]
pub struct PlaybackState {
  /// Display name of the active item, absent when idle.
  pub media: Option<String>,
  pub kind: Option<MediaKind>,
  pub playing: bool,
  pub paused: bool,
  pub looping: bool,
  pub monitor_mode: bool,
}

impl PlaybackState {
  /// Drop the active item identity. Idle state fully clears identity.
  pub fn clear_playback(&mut self) {
    self.playing = false;
    self.media = None;
    self.kind = None;
  }

  pub fn set_playback(&mut self, media: String, kind: MediaKind) {
    self.media = Some(media);
    self.kind = Some(kind);
    self.playing = true;
    self.paused = false;
  }
}

/// Status snapshot pushed to observers and returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
  pub is_playing: bool,
  pub is_paused: bool,
  pub is_looping: bool,
  pub monitor_mode: bool,
  pub current_media: Option<String>,
  pub current_type: Option<MediaKind>,
  pub position: f64,
  pub duration: f64,
  pub volume: f64,
}

/// Payload of a status update: a regular snapshot, or the one-shot
/// transition emitted when playback ends.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusPayload {
  Snapshot(StatusSnapshot),
  Transition {
    state: &'static str,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
  },
}

impl StatusPayload {
  /// Monitor mode lost its stream; the session keeps waiting.
  pub fn waiting() -> Self {
    StatusPayload::Transition {
      state: "waiting",
      mode: "monitor",
      message: Some("Waiting for stream..."),
    }
  }

  /// Playback ended; back to the library idle state.
  pub fn idle() -> Self {
    StatusPayload::Transition {
      state: "idle",
      mode: "library",
      message: None,
    }
  }
}

/// Events fanned out to connected observers.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
  StatusUpdate(StatusPayload),
  LibraryUpdated,
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  #[test]
  fn classify_by_extension() {
    assert_eq!(
      MediaKind::classify(&PathBuf::from("/m/clip.MKV")),
      Some(MediaKind::Video)
    );
    assert_eq!(
      MediaKind::classify(&PathBuf::from("/m/song.flac")),
      Some(MediaKind::Audio)
    );
    assert_eq!(
      MediaKind::classify(&PathBuf::from("/m/photo.jpeg")),
      Some(MediaKind::Image)
    );
    assert_eq!(MediaKind::classify(&PathBuf::from("/m/notes.txt")), None);
    assert_eq!(MediaKind::classify(&PathBuf::from("/m/noext")), None);
  }

  #[test]
  fn images_are_not_ipc_capable() {
    assert!(!MediaKind::Image.is_ipc_capable());
    assert!(MediaKind::Monitor.is_ipc_capable());
  }

  #[test]
  fn snapshot_field_names() {
    let snapshot = StatusSnapshot {
      is_playing: true,
      is_paused: false,
      is_looping: false,
      monitor_mode: false,
      current_media: Some("clip.mp4".to_string()),
      current_type: Some(MediaKind::Video),
      position: 1.5,
      duration: 60.0,
      volume: 100.0,
    };
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["is_playing"], true);
    assert_eq!(json["current_type"], "video");
    assert_eq!(json["volume"], 100.0);
  }

  #[test]
  fn clearing_playback_clears_identity() {
    let mut state = PlaybackState::default();
    state.set_playback("clip.mp4".to_string(), MediaKind::Video);
    state.clear_playback();
    assert!(!state.playing);
    assert!(state.media.is_none());
    assert!(state.kind.is_none());
  }
}
