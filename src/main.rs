use std::path::PathBuf;

use retrocast::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let config_path = std::env::args()
    .nth(1)
    .or_else(|| std::env::var("RETROCAST_CONFIG").ok())
    .map(PathBuf::from);
  let config = AppConfig::load(config_path.as_deref())?;

  log::info!("retrocast starting");
  log::info!("Media directory: {:?}", config.media_dir);
  log::info!("IPC socket: {:?}", config.ipc_socket);

  retrocast::run(config).await
}
