//! Soft-failing IPC client for the renderer control socket.
//!
//! The renderer may be mid-startup, wedged, or already dead; every call here
//! degrades to an absent value instead of an error. Liveness is verified
//! independently by the status watchdog.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::protocol::{IpcCommand, IpcResponse, PropertyValue};

/// Budget for one whole connect/write/read exchange.
const IPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for the renderer's path-addressed control socket.
///
/// Connections are per-command: the renderer is restarted on every playback
/// change, so a persistent connection would outlive its peer constantly.
#[derive(Debug, Clone)]
pub struct IpcClient {
  socket_path: PathBuf,
}

impl IpcClient {
  pub fn new(socket_path: PathBuf) -> Self {
    Self { socket_path }
  }

  /// Send a command and wait for its reply.
  ///
  /// Returns None when the socket path does not exist, the exchange exceeds
  /// the timeout, or no line parses as a reply.
  pub async fn send(&self, cmd: IpcCommand) -> Option<IpcResponse> {
    if !self.socket_path.exists() {
      return None;
    }

    match tokio::time::timeout(IPC_TIMEOUT, self.exchange(cmd)).await {
      Ok(reply) => reply,
      Err(_) => {
        log::debug!("IPC exchange timed out on {:?}", self.socket_path);
        None
      }
    }
  }

  async fn exchange(&self, cmd: IpcCommand) -> Option<IpcResponse> {
    let stream = match UnixStream::connect(&self.socket_path).await {
      Ok(stream) => stream,
      Err(e) => {
        log::debug!("IPC connect failed: {}", e);
        return None;
      }
    };
    let (reader, mut writer) = stream.into_split();

    let mut payload = serde_json::to_vec(&cmd).ok()?;
    payload.push(b'\n');
    writer.write_all(&payload).await.ok()?;
    writer.flush().await.ok()?;

    // The renderer interleaves event lines with replies on the same stream;
    // skip anything that is not a reply.
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
      if let Some(reply) = IpcResponse::parse(line.trim()) {
        return Some(reply);
      }
    }
    None
  }

  /// Read a property, or None when the renderer is unreachable.
  pub async fn get_property(&self, name: &str) -> Option<PropertyValue> {
    let reply = self.send(IpcCommand::get_property(name)).await?;
    reply.data.map(PropertyValue::from)
  }

  /// Set a property. True iff the renderer acknowledged with success.
  pub async fn set_property(&self, name: &str, value: Value) -> bool {
    match self.send(IpcCommand::set_property(name, value)).await {
      Some(reply) => reply.is_success(),
      None => false,
    }
  }
}
