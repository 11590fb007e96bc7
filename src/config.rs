//! Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application configuration.
///
/// Loaded from an optional JSON file; every field has a default suitable for
/// the reference appliance (Raspberry Pi, composite video out).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
  /// Root directory of the media library.
  #[serde(default = "default_media_dir")]
  pub media_dir: PathBuf,

  /// Still image shown while idle (missing file disables the splash).
  #[serde(default = "default_splash_image")]
  pub splash_image: PathBuf,

  /// Path of the renderer's IPC control socket.
  #[serde(default = "default_ipc_socket")]
  pub ipc_socket: PathBuf,

  /// DRM connector the renderer binds to.
  #[serde(default = "default_drm_connector")]
  pub drm_connector: String,

  /// HTTP listen address.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,

  /// Directory served as the web UI.
  #[serde(default = "default_static_dir")]
  pub static_dir: PathBuf,

  /// Custom mpv executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Custom yt-dlp executable path (None = auto-detect).
  #[serde(default)]
  pub ytdlp_path: Option<String>,

  /// Maximum accepted upload size in bytes.
  #[serde(default = "default_max_upload_bytes")]
  pub max_upload_bytes: usize,
}

fn default_media_dir() -> PathBuf {
  PathBuf::from("/home/pi/media")
}

fn default_splash_image() -> PathBuf {
  PathBuf::from("/home/pi/retrocast/splash.png")
}

fn default_ipc_socket() -> PathBuf {
  PathBuf::from("/tmp/retrocast-mpv.sock")
}

fn default_drm_connector() -> String {
  "Composite-1".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0:5000".to_string()
}

fn default_static_dir() -> PathBuf {
  PathBuf::from("static")
}

fn default_max_upload_bytes() -> usize {
  2 * 1024 * 1024 * 1024
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      media_dir: default_media_dir(),
      splash_image: default_splash_image(),
      ipc_socket: default_ipc_socket(),
      drm_connector: default_drm_connector(),
      bind_address: default_bind_address(),
      static_dir: default_static_dir(),
      mpv_path: None,
      ytdlp_path: None,
      max_upload_bytes: default_max_upload_bytes(),
    }
  }
}

impl AppConfig {
  /// Load configuration from a JSON file, or defaults when `path` is None.
  pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
    match path {
      Some(path) => {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
      }
      None => Ok(Self::default()),
    }
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.drm_connector.trim().is_empty() {
      return Err("DRM connector cannot be empty".to_string());
    }
    if self.bind_address.trim().is_empty() {
      return Err("Bind address cannot be empty".to_string());
    }
    if self.max_upload_bytes == 0 {
      return Err("Max upload size must be non-zero".to_string());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.drm_connector, "Composite-1");
  }

  #[test]
  fn partial_file_fills_defaults() {
    let config: AppConfig = serde_json::from_str(r#"{"media_dir": "/srv/media"}"#).unwrap();
    assert_eq!(config.media_dir, PathBuf::from("/srv/media"));
    assert_eq!(config.bind_address, "0.0.0.0:5000");
  }
}
