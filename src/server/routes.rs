//! REST handlers. Every reply is a JSON envelope with a `success` flag and,
//! on failure, a short human-readable `error` string.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::library::Library;
use crate::session::{ControllerError, ControllerEvent, StatusSnapshot};

fn failure(error: impl std::fmt::Display) -> Json<Value> {
  Json(json!({ "success": false, "error": error.to_string() }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
  Json(state.session.status().await)
}

pub async fn library(State(state): State<AppState>) -> Json<Library> {
  let library = state.library.clone();
  let scanned = tokio::task::spawn_blocking(move || library.scan())
    .await
    .unwrap_or_default();
  Json(scanned)
}

#[derive(Deserialize)]
pub struct PlayRequest {
  path: Option<String>,
}

pub async fn play(
  State(state): State<AppState>,
  Json(request): Json<PlayRequest>,
) -> Json<Value> {
  let Some(path) = request.path else {
    return failure("No path specified");
  };
  match state.session.play_local(&path).await {
    Ok(started) => Json(json!({
      "success": true,
      "type": started.kind.as_str(),
      "file": started.media,
    })),
    Err(e) => failure(e),
  }
}

#[derive(Deserialize)]
pub struct YoutubeRequest {
  url: Option<String>,
}

pub async fn youtube(
  State(state): State<AppState>,
  Json(request): Json<YoutubeRequest>,
) -> Json<Value> {
  let Some(url) = request.url else {
    return failure("No URL specified");
  };
  match state.session.play_remote(&url).await {
    Ok(started) => Json(json!({
      "success": true,
      "type": started.kind.as_str(),
      "title": started.media,
    })),
    Err(e) => failure(e),
  }
}

#[derive(Deserialize)]
pub struct MonitorRequest {
  #[serde(default = "default_enabled")]
  enabled: bool,
  #[serde(default = "default_port")]
  port: u16,
}

fn default_enabled() -> bool {
  true
}

fn default_port() -> u16 {
  1234
}

pub async fn monitor(
  State(state): State<AppState>,
  Json(request): Json<MonitorRequest>,
) -> Json<Value> {
  if request.enabled {
    match state.session.enter_monitor_mode(request.port).await {
      Ok(()) => Json(json!({
        "success": true,
        "mode": "monitor",
        "port": request.port,
      })),
      Err(e) => failure(e),
    }
  } else {
    state.session.exit_monitor_mode().await;
    Json(json!({ "success": true }))
  }
}

pub async fn control(State(state): State<AppState>, Path(action): Path<String>) -> Json<Value> {
  let session = &state.session;
  match action.as_str() {
    "play_pause" => match session.toggle_pause().await {
      Ok(paused) => Json(json!({ "success": true, "paused": paused })),
      Err(e) => failure(e),
    },
    "stop" => {
      session.stop().await;
      Json(json!({ "success": true }))
    }
    "volume_up" => volume(session, 5.0).await,
    "volume_down" => volume(session, -5.0).await,
    "seek_forward" => seek(session, 10.0).await,
    "seek_backward" => seek(session, -10.0).await,
    _ => failure("Unknown action"),
  }
}

async fn volume(session: &crate::session::SessionManager, step: f64) -> Json<Value> {
  match session.adjust_volume(step).await {
    Ok(volume) => Json(json!({ "success": true, "volume": volume })),
    Err(e) => failure(e),
  }
}

async fn seek(session: &crate::session::SessionManager, seconds: f64) -> Json<Value> {
  match session.seek(seconds).await {
    Ok(()) => Json(json!({ "success": true })),
    Err(e) => failure(e),
  }
}

#[derive(Deserialize)]
pub struct LoopRequest {
  #[serde(default)]
  enabled: bool,
}

pub async fn set_loop(
  State(state): State<AppState>,
  Json(request): Json<LoopRequest>,
) -> Json<Value> {
  state.session.set_loop(request.enabled).await;
  Json(json!({ "success": true, "loop": request.enabled }))
}

pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Json<Value> {
  while let Ok(Some(field)) = multipart.next_field().await {
    if field.name() != Some("file") {
      continue;
    }
    let Some(filename) = field.file_name().map(str::to_string) else {
      return failure("Invalid file name");
    };
    let bytes = match field.bytes().await {
      Ok(bytes) => bytes,
      Err(e) => return failure(format!("Upload read failed: {}", e)),
    };

    let library = state.library.clone();
    let stored = tokio::task::spawn_blocking(move || library.save_upload(&filename, &bytes))
      .await
      .unwrap_or(Err(ControllerError::UnknownType));

    return match stored {
      Ok(path) => {
        state.session.publish(ControllerEvent::LibraryUpdated);
        Json(json!({
          "success": true,
          "path": path.display().to_string(),
          "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()),
        }))
      }
      Err(e) => failure(e),
    };
  }
  failure("No file in request")
}

#[derive(Deserialize)]
pub struct DeleteRequest {
  path: Option<String>,
}

pub async fn delete(
  State(state): State<AppState>,
  Json(request): Json<DeleteRequest>,
) -> Json<Value> {
  let Some(path) = request.path else {
    return failure("No path specified");
  };
  match state.library.delete(&path) {
    Ok(()) => {
      state.session.publish(ControllerEvent::LibraryUpdated);
      Json(json!({ "success": true }))
    }
    Err(e) => failure(e),
  }
}
