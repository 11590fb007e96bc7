//! Playback session state machine.
//!
//! All mutating operations pass through one exclusive critical section and
//! follow "last action wins": whatever currently owns the display is torn
//! down before the requested playback starts. Transport controls ride on the
//! IPC channel and degrade rather than block.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};

use super::error::ControllerError;
use super::types::{ControllerEvent, MediaKind, PlaybackState, StatusSnapshot};
use super::watchdog::{self, WatchdogContext, WatchdogHandle};
use crate::config::AppConfig;
use crate::player::{IpcClient, IpcCommand, ProcessSupervisor};
use crate::resolver;

/// Renderer startup settle times before the first IPC contact.
const AV_SETTLE: Duration = Duration::from_millis(500);
const STREAM_SETTLE: Duration = Duration::from_secs(1);
const MONITOR_SETTLE: Duration = Duration::from_millis(500);

/// Outcome of a successful play operation.
#[derive(Debug, Clone)]
pub struct PlayStarted {
  pub kind: MediaKind,
  pub media: String,
}

/// Owns the playback session. One instance per process, shared with the
/// transport layer by `Arc`.
pub struct SessionManager {
  config: Arc<AppConfig>,
  supervisor: Arc<ProcessSupervisor>,
  ipc: IpcClient,
  state: Arc<RwLock<PlaybackState>>,
  /// Exclusive critical section for process-replacing operations.
  op_lock: Mutex<()>,
  /// The at-most-one running watchdog.
  watchdog: Mutex<Option<WatchdogHandle>>,
  events: broadcast::Sender<ControllerEvent>,
}

impl SessionManager {
  pub fn new(config: Arc<AppConfig>) -> Self {
    let (events, _) = broadcast::channel(32);
    Self {
      supervisor: Arc::new(ProcessSupervisor::new(config.clone())),
      ipc: IpcClient::new(config.ipc_socket.clone()),
      config,
      state: Arc::new(RwLock::new(PlaybackState::default())),
      op_lock: Mutex::new(()),
      watchdog: Mutex::new(None),
      events,
    }
  }

  /// Subscribe to status and library events.
  pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
    self.events.subscribe()
  }

  /// Publish an event to all observers.
  pub fn publish(&self, event: ControllerEvent) {
    let _ = self.events.send(event);
  }

  /// Show the idle splash at process start.
  pub fn startup(&self) {
    self.supervisor.cleanup_ipc_socket();
    self.supervisor.show_splash();
  }

  /// Cancel and join the running watchdog, if any. Must complete before an
  /// operation replaces the active process, so a stale run cannot emit an
  /// ended transition into the new session.
  async fn cancel_watchdog(&self) {
    let handle = self.watchdog.lock().await.take();
    if let Some(handle) = handle {
      handle.cancel().await;
    }
  }

  async fn start_watchdog(&self) {
    let ctx = WatchdogContext {
      supervisor: self.supervisor.clone(),
      state: self.state.clone(),
      ipc: self.ipc.clone(),
      events: self.events.clone(),
    };
    *self.watchdog.lock().await = Some(watchdog::spawn(ctx));
  }

  /// Restore a known idle display after a failed start. The op lock is held
  /// by the caller.
  fn restore_idle(&self) {
    let mut state = self.state.write();
    state.clear_playback();
    state.paused = false;
    state.monitor_mode = false;
    drop(state);
    self.supervisor.show_splash();
  }

  /// Play a local media file from the library.
  pub async fn play_local(&self, path: &str) -> Result<PlayStarted, ControllerError> {
    // Validation mutates nothing; failing here leaves the current playback
    // and its watchdog untouched.
    let (resolved, kind) = validate_local_path(&self.config.media_dir, Path::new(path))?;

    self.cancel_watchdog().await;
    let _op = self.op_lock.lock().await;

    self.supervisor.stop_all().await;
    self.supervisor.cleanup_ipc_socket();
    self.state.write().monitor_mode = false;

    let media = resolved
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.to_string());
    let file = resolved.display().to_string();

    let started = match kind {
      MediaKind::Image => {
        let args = self.supervisor.image_args(&file);
        self.supervisor.start_renderer(&args)
      }
      _ => {
        let mut args = self.supervisor.base_args();
        if self.state.read().looping {
          args.push("--loop-file=inf".to_string());
        }
        args.push(file);
        self.supervisor.start_renderer(&args)
      }
    };
    if let Err(e) = started {
      self.restore_idle();
      return Err(e.into());
    }

    self.state.write().set_playback(media.clone(), kind);
    if kind.is_ipc_capable() {
      tokio::time::sleep(AV_SETTLE).await;
      self.start_watchdog().await;
    }

    log::info!("Playing local file {} as {}", media, kind.as_str());
    Ok(PlayStarted { kind, media })
  }

  /// Resolve a remote URL and play the extracted stream.
  pub async fn play_remote(&self, url: &str) -> Result<PlayStarted, ControllerError> {
    self.cancel_watchdog().await;
    let _op = self.op_lock.lock().await;

    self.supervisor.stop_all().await;
    self.supervisor.cleanup_ipc_socket();
    self.state.write().monitor_mode = false;

    let stream = match resolver::resolve(&self.config, url).await {
      Ok(stream) => stream,
      Err(e) => {
        self.restore_idle();
        return Err(e);
      }
    };

    // The loop flag applies to local files only; for streams the loop
    // property is pushed over IPC when set.
    let mut args = self.supervisor.base_args();
    args.push(stream.video_url.clone());
    if let Some(ref audio_url) = stream.audio_url {
      args.push(format!("--audio-file={}", audio_url));
    }

    if let Err(e) = self.supervisor.start_renderer(&args) {
      self.restore_idle();
      return Err(e.into());
    }
    tokio::time::sleep(STREAM_SETTLE).await;

    self
      .state
      .write()
      .set_playback(stream.title.clone(), MediaKind::Stream);
    self.start_watchdog().await;

    log::info!("Playing stream: {}", stream.title);
    Ok(PlayStarted {
      kind: MediaKind::Stream,
      media: stream.title,
    })
  }

  /// Listen for an incoming transport stream on a UDP port.
  pub async fn enter_monitor_mode(&self, port: u16) -> Result<(), ControllerError> {
    self.cancel_watchdog().await;
    let _op = self.op_lock.lock().await;

    self.supervisor.stop_all().await;
    self.supervisor.cleanup_ipc_socket();

    let args = self.supervisor.monitor_args(port);
    if let Err(e) = self.supervisor.start_renderer(&args) {
      self.restore_idle();
      return Err(e.into());
    }
    tokio::time::sleep(MONITOR_SETTLE).await;

    {
      let mut state = self.state.write();
      state.set_playback(format!("Monitor UDP:{}", port), MediaKind::Monitor);
      state.monitor_mode = true;
    }
    self.start_watchdog().await;

    log::info!("Monitor mode listening on UDP port {}", port);
    Ok(())
  }

  /// Leave monitor mode. Identical to `stop`: idle state with the splash.
  pub async fn exit_monitor_mode(&self) {
    self.stop().await;
  }

  /// Stop playback and return to idle. Idempotent; never fails.
  pub async fn stop(&self) {
    self.cancel_watchdog().await;
    let _op = self.op_lock.lock().await;

    {
      let mut state = self.state.write();
      state.monitor_mode = false;
      state.paused = false;
      state.clear_playback();
    }
    self.supervisor.stop_all().await;
    self.supervisor.cleanup_ipc_socket();
    self.supervisor.show_splash();
    log::info!("Playback stopped, session is idle");
  }

  /// Kill every owned process on controller shutdown. Unlike `stop`, the
  /// splash is not respawned: nothing may outlive the controller holding
  /// the display.
  pub async fn shutdown(&self) {
    self.cancel_watchdog().await;
    let _op = self.op_lock.lock().await;
    self.state.write().clear_playback();
    self.supervisor.stop_all().await;
    self.supervisor.cleanup_ipc_socket();
    log::info!("Session shut down");
  }

  /// Toggle pause. Images have no pause concept; success, not paused.
  pub async fn toggle_pause(&self) -> Result<bool, ControllerError> {
    if self.state.read().kind == Some(MediaKind::Image) {
      return Ok(false);
    }

    match self.ipc.send(IpcCommand::cycle("pause")).await {
      Some(_) => {
        let mut state = self.state.write();
        state.paused = !state.paused;
        Ok(state.paused)
      }
      None => Err(ControllerError::NoActivePlayback),
    }
  }

  /// Set the loop flag. The flag always updates; if a renderer-backed kind
  /// is active the property is also pushed best-effort (the flag is honored
  /// on the next start regardless).
  pub async fn set_loop(&self, enabled: bool) {
    let kind = {
      let mut state = self.state.write();
      state.looping = enabled;
      state.kind
    };

    if matches!(
      kind,
      Some(MediaKind::Video | MediaKind::Audio | MediaKind::Stream)
    ) {
      let value = if enabled { "inf" } else { "no" };
      if !self.ipc.set_property("loop-file", value.into()).await {
        log::debug!("Loop property push failed; flag applies on next start");
      }
    }
  }

  /// Seek relative to the current position.
  pub async fn seek(&self, seconds: f64) -> Result<(), ControllerError> {
    match self.ipc.send(IpcCommand::seek_relative(seconds)).await {
      Some(_) => Ok(()),
      None => Err(ControllerError::NoActivePlayback),
    }
  }

  /// Adjust volume by a signed step and read back the resulting level.
  pub async fn adjust_volume(&self, step: f64) -> Result<Option<f64>, ControllerError> {
    let reply = self.ipc.send(IpcCommand::add("volume", step)).await;
    let volume = self
      .ipc
      .get_property("volume")
      .await
      .and_then(|v| v.as_f64());
    match reply {
      Some(_) => Ok(volume),
      None => Err(ControllerError::NoActivePlayback),
    }
  }

  /// Current status. Never fails; unreachable IPC yields baseline values.
  pub async fn status(&self) -> StatusSnapshot {
    collect_status(&self.state, &self.ipc).await
  }
}

/// Build a status snapshot: session flags plus, for renderer-backed kinds,
/// live position/duration/volume/pause. Every IPC read independently falls
/// back to its baseline.
pub(crate) async fn collect_status(
  state: &RwLock<PlaybackState>,
  ipc: &IpcClient,
) -> StatusSnapshot {
  let mut snapshot = {
    let state = state.read();
    StatusSnapshot {
      is_playing: state.playing,
      is_paused: state.paused,
      is_looping: state.looping,
      monitor_mode: state.monitor_mode,
      current_media: state.media.clone(),
      current_type: state.kind,
      position: 0.0,
      duration: 0.0,
      volume: 100.0,
    }
  };

  if snapshot.current_type.is_some_and(MediaKind::is_ipc_capable) {
    if let Some(position) = ipc.get_property("time-pos").await.and_then(|v| v.as_f64()) {
      snapshot.position = position;
    }
    if let Some(duration) = ipc.get_property("duration").await.and_then(|v| v.as_f64()) {
      snapshot.duration = duration;
    }
    if let Some(volume) = ipc.get_property("volume").await.and_then(|v| v.as_f64()) {
      snapshot.volume = volume;
    }
    if let Some(paused) = ipc.get_property("pause").await.and_then(|v| v.as_bool()) {
      snapshot.is_paused = paused;
    }
  }

  snapshot
}

/// Validate a playback path: it must exist, resolve inside the media root,
/// and classify to a known local kind.
fn validate_local_path(
  media_dir: &Path,
  path: &Path,
) -> Result<(PathBuf, MediaKind), ControllerError> {
  if !path.exists() {
    return Err(ControllerError::NotFound);
  }

  let resolved = path.canonicalize().map_err(|_| ControllerError::PathDenied)?;
  let root = media_dir
    .canonicalize()
    .map_err(|_| ControllerError::PathDenied)?;
  if !resolved.starts_with(&root) {
    return Err(ControllerError::PathDenied);
  }

  let kind = MediaKind::classify(&resolved).ok_or(ControllerError::UnknownType)?;
  Ok((resolved, kind))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_manager() -> (tempfile::TempDir, SessionManager) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.media_dir = dir.path().join("media");
    config.ipc_socket = dir.path().join("missing.sock");
    config.splash_image = dir.path().join("missing.png");
    std::fs::create_dir_all(&config.media_dir).unwrap();
    (dir, SessionManager::new(Arc::new(config)))
  }

  #[test]
  fn path_validation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("media");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("clip.mp4"), b"x").unwrap();
    std::fs::write(root.join("notes.txt"), b"x").unwrap();
    std::fs::write(dir.path().join("outside.mp4"), b"x").unwrap();

    let (_, kind) = validate_local_path(&root, &root.join("clip.mp4")).unwrap();
    assert_eq!(kind, MediaKind::Video);

    assert!(matches!(
      validate_local_path(&root, &root.join("missing.mp4")),
      Err(ControllerError::NotFound)
    ));
    assert!(matches!(
      validate_local_path(&root, &dir.path().join("outside.mp4")),
      Err(ControllerError::PathDenied)
    ));
    assert!(matches!(
      validate_local_path(&root, &root.join("../outside.mp4")),
      Err(ControllerError::PathDenied)
    ));
    assert!(matches!(
      validate_local_path(&root, &root.join("notes.txt")),
      Err(ControllerError::UnknownType)
    ));
  }

  #[tokio::test]
  async fn denied_path_spawns_nothing() {
    let (dir, manager) = test_manager();
    std::fs::write(dir.path().join("outside.mp4"), b"x").unwrap();

    let denied = manager
      .play_local(dir.path().join("outside.mp4").to_str().unwrap())
      .await;
    assert!(matches!(denied, Err(ControllerError::PathDenied)));
    assert!(manager.supervisor.poll_current().unwrap().is_none());
    assert!(!manager.state.read().playing);
  }

  #[tokio::test]
  async fn stop_is_idempotent() {
    let (_dir, manager) = test_manager();
    manager.stop().await;
    let first = manager.status().await;
    manager.stop().await;
    let second = manager.status().await;

    for snapshot in [first, second] {
      assert!(!snapshot.is_playing);
      assert!(snapshot.current_media.is_none());
      assert!(snapshot.current_type.is_none());
      assert!(!snapshot.monitor_mode);
    }
  }

  #[tokio::test]
  async fn loop_flag_survives_unreachable_ipc() {
    let (_dir, manager) = test_manager();
    manager.set_loop(true).await;
    let snapshot = manager.status().await;
    assert!(snapshot.is_looping);

    manager.set_loop(false).await;
    assert!(!manager.status().await.is_looping);
  }

  #[tokio::test]
  async fn transport_controls_require_a_renderer() {
    let (_dir, manager) = test_manager();
    assert!(matches!(
      manager.toggle_pause().await,
      Err(ControllerError::NoActivePlayback)
    ));
    assert!(matches!(
      manager.seek(10.0).await,
      Err(ControllerError::NoActivePlayback)
    ));
    assert!(matches!(
      manager.adjust_volume(5.0).await,
      Err(ControllerError::NoActivePlayback)
    ));
  }

  #[tokio::test]
  async fn status_baselines_without_ipc() {
    let (_dir, manager) = test_manager();
    let snapshot = manager.status().await;
    assert_eq!(snapshot.position, 0.0);
    assert_eq!(snapshot.duration, 0.0);
    assert_eq!(snapshot.volume, 100.0);
  }
}
