//! Status watchdog: one background run per playback session.
//!
//! Polls process liveness and IPC responsiveness once per second, pushes
//! status snapshots to observers, and restores the idle splash state when
//! playback ends, whether the renderer exited cleanly, died silently, or
//! the loop itself keeps failing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::collect_status;
use super::types::{ControllerEvent, MediaKind, PlaybackState, StatusPayload};
use crate::player::{IpcClient, ProcessSupervisor};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive absent `time-pos` replies before playback counts as ended.
const MAX_IPC_FAILURES: u32 = 5;

/// Consecutive loop-internal errors before recovery is forced. The loop
/// must never spin broken forever.
const MAX_INTERNAL_FAILURES: u32 = 10;

/// Everything one watchdog run needs.
#[derive(Clone)]
pub(crate) struct WatchdogContext {
  pub supervisor: Arc<ProcessSupervisor>,
  pub state: Arc<RwLock<PlaybackState>>,
  pub ipc: IpcClient,
  pub events: broadcast::Sender<ControllerEvent>,
}

/// Handle to a running watchdog.
pub(crate) struct WatchdogHandle {
  token: CancellationToken,
  task: JoinHandle<()>,
}

impl WatchdogHandle {
  /// Cancel the run and join it with a bounded wait. Cancellation is
  /// observable within one poll interval.
  pub async fn cancel(self) {
    self.token.cancel();
    if tokio::time::timeout(JOIN_TIMEOUT, self.task).await.is_err() {
      log::warn!("Watchdog did not stop within {:?}", JOIN_TIMEOUT);
    }
  }
}

/// Spawn a fresh watchdog run for the session that just started.
pub(crate) fn spawn(ctx: WatchdogContext) -> WatchdogHandle {
  let token = CancellationToken::new();
  let run_token = token.clone();
  let task = tokio::spawn(async move {
    run(ctx, run_token).await;
  });
  WatchdogHandle { token, task }
}

enum Tick {
  Running,
  Ended,
}

async fn run(ctx: WatchdogContext, token: CancellationToken) {
  log::info!("Watchdog started");
  let mut interval = tokio::time::interval(POLL_INTERVAL);
  let mut ipc_failures: u32 = 0;
  let mut internal_failures: u32 = 0;

  loop {
    tokio::select! {
      _ = token.cancelled() => {
        log::info!("Watchdog cancelled");
        return;
      }
      _ = interval.tick() => {}
    }

    match tick(&ctx, &mut ipc_failures).await {
      Ok(Tick::Ended) => break,
      Ok(Tick::Running) => internal_failures = 0,
      Err(e) => {
        log::warn!("Watchdog tick failed: {}", e);
        internal_failures += 1;
        if internal_failures >= MAX_INTERNAL_FAILURES {
          log::error!("Too many consecutive watchdog failures, forcing recovery");
          break;
        }
      }
    }
  }

  recover(&ctx).await;
}

async fn tick(ctx: &WatchdogContext, ipc_failures: &mut u32) -> std::io::Result<Tick> {
  if let Some(status) = ctx.supervisor.poll_current()? {
    log::info!("Renderer exited with {}", status);
    return Ok(Tick::Ended);
  }

  let (kind, playing) = {
    let state = ctx.state.read();
    (state.kind, state.playing)
  };

  if kind.is_some_and(MediaKind::is_ipc_capable) {
    match ctx.ipc.get_property("time-pos").await {
      None if playing => {
        *ipc_failures += 1;
        if *ipc_failures >= MAX_IPC_FAILURES {
          log::warn!("Renderer unresponsive, treating playback as ended");
          return Ok(Tick::Ended);
        }
      }
      _ => *ipc_failures = 0,
    }
  }

  let snapshot = collect_status(&ctx.state, &ctx.ipc).await;
  let _ = ctx
    .events
    .send(ControllerEvent::StatusUpdate(StatusPayload::Snapshot(snapshot)));
  Ok(Tick::Running)
}

/// Playback-ended recovery: reap the renderer, clear identity, show the
/// splash and notify observers exactly once.
async fn recover(ctx: &WatchdogContext) {
  ctx.supervisor.discard_current().await;

  let monitor_mode = {
    let mut state = ctx.state.write();
    state.clear_playback();
    state.monitor_mode
  };

  ctx.supervisor.show_splash();

  let payload = if monitor_mode {
    StatusPayload::waiting()
  } else {
    StatusPayload::idle()
  };
  let _ = ctx.events.send(ControllerEvent::StatusUpdate(payload));
  log::info!("Watchdog finished, session is idle");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use std::process::{Command, Stdio};

  fn context() -> (WatchdogContext, broadcast::Receiver<ControllerEvent>) {
    let mut config = AppConfig::default();
    // Paths inside a dropped tempdir: guaranteed absent.
    let dir = tempfile::tempdir().unwrap();
    config.ipc_socket = dir.path().join("missing.sock");
    config.splash_image = dir.path().join("missing.png");
    let config = Arc::new(config);

    let (events, rx) = broadcast::channel(64);
    let ctx = WatchdogContext {
      supervisor: Arc::new(ProcessSupervisor::new(config.clone())),
      state: Arc::new(RwLock::new(PlaybackState::default())),
      ipc: IpcClient::new(config.ipc_socket.clone()),
      events,
    };
    (ctx, rx)
  }

  #[tokio::test(start_paused = true)]
  async fn unresponsive_renderer_ends_playback() {
    let (ctx, mut rx) = context();
    {
      let mut state = ctx.state.write();
      state.set_playback("stream".to_string(), MediaKind::Stream);
    }
    let child = Command::new("sleep")
      .arg("600")
      .stdout(Stdio::null())
      .spawn()
      .unwrap();
    ctx.supervisor.set_current_for_test(child);

    let handle = spawn(ctx.clone());
    handle.task.await.unwrap();

    let state = ctx.state.read();
    assert!(!state.playing);
    assert!(state.media.is_none());
    assert!(state.kind.is_none());
    drop(state);

    // The last broadcast is the idle transition.
    let mut saw_idle = false;
    while let Ok(event) = rx.try_recv() {
      if let ControllerEvent::StatusUpdate(StatusPayload::Transition { state, .. }) = event {
        assert_eq!(state, "idle");
        saw_idle = true;
      }
    }
    assert!(saw_idle);
  }

  #[tokio::test(start_paused = true)]
  async fn monitor_mode_reports_waiting() {
    let (ctx, mut rx) = context();
    {
      let mut state = ctx.state.write();
      state.set_playback("Monitor UDP:1234".to_string(), MediaKind::Monitor);
      state.monitor_mode = true;
    }

    // No renderer process at all: the exit poll reports nothing and the
    // IPC failures accumulate to the ceiling.
    let handle = spawn(ctx.clone());
    handle.task.await.unwrap();

    assert!(ctx.state.read().monitor_mode);
    let mut saw_waiting = false;
    while let Ok(event) = rx.try_recv() {
      if let ControllerEvent::StatusUpdate(StatusPayload::Transition { state, .. }) = event {
        assert_eq!(state, "waiting");
        saw_waiting = true;
      }
    }
    assert!(saw_waiting);
  }

  #[tokio::test(start_paused = true)]
  async fn cancel_stops_the_run_without_recovery() {
    let (ctx, mut rx) = context();
    {
      let mut state = ctx.state.write();
      state.set_playback("clip.mp4".to_string(), MediaKind::Video);
    }

    let handle = spawn(ctx.clone());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.cancel().await;

    // Cancelled runs must not emit an ended transition.
    while let Ok(event) = rx.try_recv() {
      assert!(matches!(
        event,
        ControllerEvent::StatusUpdate(StatusPayload::Snapshot(_))
      ));
    }
  }
}
