//! Player process supervision: spawning, tracking and terminating the
//! renderer and splash processes that own the physical display.

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::AppConfig;

/// Process names that can hold the display. Termination is policy-based:
/// a stray instance from a prior crash is outside our bookkeeping but still
/// blocks the DRM connector.
const RENDERER_PROCESS_NAMES: &[&str] = &["mpv", "vlc", "fbi", "fim"];

/// Pause after kill signals so the display resource is released.
const KILL_GRACE: Duration = Duration::from_millis(300);

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("{0} executable not found")]
  NotFound(&'static str),
  #[error("Failed to spawn renderer: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// Owns the at-most-one renderer process and the at-most-one splash process.
pub struct ProcessSupervisor {
  config: Arc<AppConfig>,
  current: Mutex<Option<Child>>,
  splash: Mutex<Option<Child>>,
}

impl ProcessSupervisor {
  pub fn new(config: Arc<AppConfig>) -> Self {
    Self {
      config,
      current: Mutex::new(None),
      splash: Mutex::new(None),
    }
  }

  /// Find the mpv executable, honoring the configured override.
  fn find_mpv(&self) -> Result<PathBuf, ProcessError> {
    if let Some(ref path) = self.config.mpv_path {
      let path = PathBuf::from(path);
      if path.exists() {
        return Ok(path);
      }
    }
    which::which("mpv").map_err(|_| ProcessError::NotFound("mpv"))
  }

  fn find_openvt(&self) -> Result<PathBuf, ProcessError> {
    which::which("openvt").map_err(|_| ProcessError::NotFound("openvt"))
  }

  /// Renderer arguments for audio/video playback on the composite output.
  pub fn base_args(&self) -> Vec<String> {
    vec![
      "--vo=drm".to_string(),
      format!("--drm-connector={}", self.config.drm_connector),
      "--fs".to_string(),
      "--af=scaletempo".to_string(),
      format!("--input-ipc-server={}", self.config.ipc_socket.display()),
      "--no-terminal".to_string(),
      "--no-osc".to_string(),
      "--no-config".to_string(),
      "--cache=yes".to_string(),
      "--cache-secs=10".to_string(),
      "--demuxer-max-bytes=50M".to_string(),
      "--hwdec=auto".to_string(),
      "--video-sync=audio".to_string(),
      "--audio-device=auto".to_string(),
    ]
  }

  /// Renderer arguments for still-image display. The composite output is
  /// 4:3; images get a forced aspect override.
  pub fn image_args(&self, path: &str) -> Vec<String> {
    vec![
      "--vo=drm".to_string(),
      format!("--drm-connector={}", self.config.drm_connector),
      "--fs".to_string(),
      "--image-display-duration=inf".to_string(),
      format!("--input-ipc-server={}", self.config.ipc_socket.display()),
      "--no-terminal".to_string(),
      "--no-osc".to_string(),
      "--no-config".to_string(),
      "--loop-file=inf".to_string(),
      "--video-aspect-override=4:3".to_string(),
      path.to_string(),
    ]
  }

  /// Renderer arguments for monitor mode: a UDP listener that stays
  /// resident through stream loss.
  pub fn monitor_args(&self, port: u16) -> Vec<String> {
    vec![
      "--vo=drm".to_string(),
      format!("--drm-connector={}", self.config.drm_connector),
      "--fs".to_string(),
      "--af=scaletempo".to_string(),
      format!("--input-ipc-server={}", self.config.ipc_socket.display()),
      "--no-terminal".to_string(),
      "--no-osc".to_string(),
      "--no-config".to_string(),
      "--idle=yes".to_string(),
      "--force-window=yes".to_string(),
      "--keep-open=always".to_string(),
      "--network-timeout=30".to_string(),
      format!("udp://@:{}", port),
    ]
  }

  /// Splash renderer arguments. No IPC server: the splash is never queried.
  fn splash_args(&self) -> Vec<String> {
    vec![
      "--vo=drm".to_string(),
      format!("--drm-connector={}", self.config.drm_connector),
      "--fs".to_string(),
      "--image-display-duration=inf".to_string(),
      "--no-terminal".to_string(),
      "--no-osc".to_string(),
      "--no-config".to_string(),
      "--video-aspect-override=4:3".to_string(),
      "--really-quiet".to_string(),
      self.config.splash_image.display().to_string(),
    ]
  }

  /// Spawn mpv on tty1 via openvt for VT/DRM access.
  fn spawn(&self, args: &[String]) -> Result<Child, ProcessError> {
    let openvt = self.find_openvt()?;
    let mpv = self.find_mpv()?;

    log::info!("Spawning renderer: {:?} {:?}", mpv, args);
    let child = Command::new(openvt)
      .args(["-f", "-s", "-c", "1", "--"])
      .arg(mpv)
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()?;
    Ok(child)
  }

  /// Spawn the renderer and track it as the current process.
  pub fn start_renderer(&self, args: &[String]) -> Result<(), ProcessError> {
    let child = self.spawn(args)?;
    if let Some(old) = self.current.lock().replace(child) {
      // stop_all should already have cleared this; reap whatever is left.
      kill_child(old);
    }
    Ok(())
  }

  /// Poll the tracked renderer for a terminal exit status.
  pub fn poll_current(&self) -> std::io::Result<Option<ExitStatus>> {
    match self.current.lock().as_mut() {
      Some(child) => child.try_wait(),
      None => Ok(None),
    }
  }

  /// Kill and reap the tracked renderer, if any.
  pub async fn discard_current(&self) {
    let child = self.current.lock().take();
    if let Some(child) = child {
      let _ = tokio::task::spawn_blocking(move || kill_child(child)).await;
    }
  }

  /// Unconditionally terminate everything that could be holding the display:
  /// the tracked splash and renderer handles, then a name-based sweep over
  /// the renderer family. Individual failures are logged and swallowed.
  pub async fn stop_all(&self) {
    let splash = self.splash.lock().take();
    let current = self.current.lock().take();

    let _ = tokio::task::spawn_blocking(move || {
      for child in [splash, current].into_iter().flatten() {
        kill_child(child);
      }
      sweep("-TERM");
    })
    .await;

    tokio::time::sleep(KILL_GRACE).await;

    let _ = tokio::task::spawn_blocking(|| sweep("-KILL")).await;
    tokio::time::sleep(KILL_GRACE).await;
  }

  /// Show the idle splash image, replacing any existing splash process.
  /// A missing splash asset is a no-op.
  pub fn show_splash(&self) {
    if let Some(old) = self.splash.lock().take() {
      kill_child(old);
    }

    if !self.config.splash_image.exists() {
      log::debug!("No splash asset at {:?}", self.config.splash_image);
      return;
    }

    match self.spawn(&self.splash_args()) {
      Ok(child) => {
        *self.splash.lock() = Some(child);
        log::info!("Splash screen displayed");
      }
      Err(e) => log::warn!("Failed to show splash: {}", e),
    }
  }

  /// Remove a stale control socket left by a previous renderer.
  pub fn cleanup_ipc_socket(&self) {
    let _ = std::fs::remove_file(&self.config.ipc_socket);
  }

  #[cfg(test)]
  pub(crate) fn set_current_for_test(&self, child: Child) {
    *self.current.lock() = Some(child);
  }
}

fn kill_child(mut child: Child) {
  let pid = child.id();
  if let Err(e) = child.kill() {
    log::debug!("kill pid {} failed: {}", pid, e);
  }
  match child.wait() {
    Ok(status) => log::info!("Process {} exited with {}", pid, status),
    Err(e) => log::warn!("wait on pid {} failed: {}", pid, e),
  }
}

fn sweep(signal: &str) {
  for name in RENDERER_PROCESS_NAMES {
    // pkill exits non-zero when nothing matched; that is the common case.
    let _ = Command::new("pkill")
      .args([signal, name])
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(Arc::new(AppConfig::default()))
  }

  #[test]
  fn base_args_select_composite_output() {
    let args = supervisor().base_args();
    assert!(args.contains(&"--drm-connector=Composite-1".to_string()));
    assert!(args.contains(&"--input-ipc-server=/tmp/retrocast-mpv.sock".to_string()));
    assert!(args.contains(&"--demuxer-max-bytes=50M".to_string()));
  }

  #[test]
  fn image_args_loop_forever() {
    let args = supervisor().image_args("/media/photo.jpg");
    assert!(args.contains(&"--image-display-duration=inf".to_string()));
    assert!(args.contains(&"--loop-file=inf".to_string()));
    assert!(args.contains(&"--video-aspect-override=4:3".to_string()));
    assert_eq!(args.last().unwrap(), "/media/photo.jpg");
  }

  #[test]
  fn monitor_args_bind_udp_listener() {
    let args = supervisor().monitor_args(1234);
    assert!(args.contains(&"udp://@:1234".to_string()));
    assert!(args.contains(&"--idle=yes".to_string()));
    assert!(args.contains(&"--keep-open=always".to_string()));
  }

  #[test]
  fn splash_has_no_ipc_server() {
    let args = supervisor().splash_args();
    assert!(!args.iter().any(|a| a.starts_with("--input-ipc-server")));
    assert!(args.contains(&"--really-quiet".to_string()));
  }

  #[test]
  fn poll_with_no_process_is_none() {
    assert!(supervisor().poll_current().unwrap().is_none());
  }
}
