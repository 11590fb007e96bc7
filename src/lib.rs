//! Headless media playback controller for composite-video appliances.
//!
//! One renderer process owns the physical display at a time; requests follow
//! "last action wins". The HTTP/WebSocket transport in [`server`] is a thin
//! surface over the [`session`] state machine.

use std::sync::Arc;

mod config;
mod library;
mod player;
mod resolver;
mod server;
mod session;

pub use config::AppConfig;

use library::LibraryManager;
use server::AppState;
use session::SessionManager;

/// Run the controller until a shutdown signal arrives.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
  let config = Arc::new(config);

  let library = Arc::new(LibraryManager::new(config.media_dir.clone()));
  library.ensure_dirs()?;

  let session = Arc::new(SessionManager::new(config.clone()));
  session.startup();

  let state = AppState {
    session: session.clone(),
    library,
  };
  let app = server::router(state, &config);

  let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
  log::info!("Listening on {}", config.bind_address);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  // Shutdown takes the same teardown path as an explicit stop: nothing may
  // outlive the controller holding the display.
  session.shutdown().await;
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      log::error!("Failed to install Ctrl-C handler: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        log::error!("Failed to install SIGTERM handler: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => log::info!("Received Ctrl-C, shutting down"),
    _ = terminate => log::info!("Received SIGTERM, shutting down"),
  }
}
