//! WebSocket status push.
//!
//! Frames are `{"event": <name>, "data": <payload>}`. Clients receive a
//! snapshot on connect, every watchdog tick, and on library changes; they
//! may also request `get_status` / `get_library` directly.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use super::AppState;
use crate::session::ControllerEvent;

pub async fn websocket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
  ws.on_upgrade(|socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
  let (mut sender, mut receiver) = socket.split();
  let mut events = state.session.subscribe();

  let snapshot = state.session.status().await;
  if send_frame(&mut sender, "status_update", json!(snapshot))
    .await
    .is_err()
  {
    return;
  }

  loop {
    tokio::select! {
      event = events.recv() => match event {
        Ok(ControllerEvent::StatusUpdate(payload)) => {
          if send_frame(&mut sender, "status_update", json!(payload)).await.is_err() {
            break;
          }
        }
        Ok(ControllerEvent::LibraryUpdated) => {
          if send_frame(&mut sender, "library_updated", json!(null)).await.is_err() {
            break;
          }
        }
        Err(RecvError::Lagged(skipped)) => {
          log::debug!("WebSocket client lagged {} events", skipped);
        }
        Err(RecvError::Closed) => break,
      },
      message = receiver.next() => match message {
        Some(Ok(Message::Text(text))) => {
          if handle_request(text.as_str(), &mut sender, &state).await.is_err() {
            break;
          }
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          log::debug!("WebSocket receive error: {}", e);
          break;
        }
      },
    }
  }
}

async fn handle_request(
  request: &str,
  sender: &mut SplitSink<WebSocket, Message>,
  state: &AppState,
) -> Result<(), axum::Error> {
  match request.trim() {
    "get_status" => {
      let snapshot = state.session.status().await;
      send_frame(sender, "status_update", json!(snapshot)).await
    }
    "get_library" => {
      let library = state.library.clone();
      let scanned = tokio::task::spawn_blocking(move || library.scan())
        .await
        .unwrap_or_default();
      send_frame(sender, "library_data", json!(scanned)).await
    }
    other => {
      log::debug!("Ignoring unknown WebSocket request: {}", other);
      Ok(())
    }
  }
}

async fn send_frame(
  sender: &mut SplitSink<WebSocket, Message>,
  event: &str,
  data: serde_json::Value,
) -> Result<(), axum::Error> {
  let frame = json!({ "event": event, "data": data }).to_string();
  sender.send(Message::Text(frame.into())).await
}
