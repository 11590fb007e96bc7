//! HTTP/WebSocket transport exposing the session operation surface.

mod routes;
mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::services::ServeDir;

use crate::config::AppConfig;
use crate::library::LibraryManager;
use crate::session::SessionManager;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
  pub session: Arc<SessionManager>,
  pub library: Arc<LibraryManager>,
}

/// Build the application router.
pub fn router(state: AppState, config: &AppConfig) -> Router {
  Router::new()
    .route("/api/status", get(routes::status))
    .route("/api/library", get(routes::library))
    .route("/api/play", post(routes::play))
    .route("/api/youtube", post(routes::youtube))
    .route("/api/monitor", post(routes::monitor))
    .route("/api/control/{action}", post(routes::control))
    .route("/api/loop", post(routes::set_loop))
    .route("/api/upload", post(routes::upload))
    .route("/api/delete", post(routes::delete))
    .route("/ws", any(ws::websocket))
    .fallback_service(ServeDir::new(&config.static_dir))
    .layer(DefaultBodyLimit::max(config.max_upload_bytes))
    .with_state(state)
}
