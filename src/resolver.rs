//! Remote URL resolution through the external extractor tool (yt-dlp).
//!
//! The extractor prints a title line followed by direct stream URLs. Two or
//! more URLs mean separately muxed video and audio tracks.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::AppConfig;
use crate::session::ControllerError;

/// Quality ceiling for the constrained decoder: 480p, separate video+audio
/// preferred over combined.
const FORMAT_SELECTION: &str = "bestvideo[height<=480]+bestaudio/best[height<=480]/best";

/// Bound on the whole extractor invocation.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Diagnostic text from the extractor is truncated to this length.
const MAX_ERROR_LEN: usize = 200;

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
  pub title: String,
  pub video_url: String,
  pub audio_url: Option<String>,
}

fn find_ytdlp(config: &AppConfig) -> Result<PathBuf, ControllerError> {
  if let Some(ref path) = config.ytdlp_path {
    let path = PathBuf::from(path);
    if path.exists() {
      return Ok(path);
    }
  }
  which::which("yt-dlp").map_err(|_| ControllerError::Resolve("yt-dlp not found".to_string()))
}

/// Resolve a remote URL to direct stream URLs.
pub async fn resolve(config: &AppConfig, url: &str) -> Result<ResolvedStream, ControllerError> {
  let ytdlp = find_ytdlp(config)?;

  log::info!("Resolving stream URL: {}", url);
  let invocation = Command::new(ytdlp)
    .args(["-f", FORMAT_SELECTION])
    .args(["-g", "--get-title", "--no-playlist", "--no-warnings"])
    .args(["--no-check-certificates"])
    .args(["--socket-timeout", "15"])
    .args(["--cache-dir", "/tmp/yt-dlp-cache"])
    .arg(url)
    .stdin(Stdio::null())
    .output();

  let output = tokio::time::timeout(RESOLVE_TIMEOUT, invocation)
    .await
    .map_err(|_| ControllerError::Resolve("Timed out resolving stream URL".to_string()))?
    .map_err(|e| ControllerError::Resolve(e.to_string()))?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match stderr.trim() {
      "" => "Stream extractor failed".to_string(),
      text => truncate(text, MAX_ERROR_LEN),
    };
    return Err(ControllerError::Resolve(message));
  }

  parse_output(&String::from_utf8_lossy(&output.stdout))
    .ok_or_else(|| ControllerError::Resolve("No stream URL extracted".to_string()))
}

/// Parse extractor stdout: a title line, then `http`-prefixed stream URLs.
/// Some extractors emit only URLs; then the title falls back to a
/// placeholder and every line counts.
fn parse_output(stdout: &str) -> Option<ResolvedStream> {
  let lines: Vec<&str> = stdout
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .collect();
  let (first, rest) = lines.split_first()?;

  let mut title = first.to_string();
  let mut urls: Vec<&str> = rest
    .iter()
    .copied()
    .filter(|l| l.starts_with("http"))
    .collect();

  if urls.is_empty() {
    urls = lines
      .iter()
      .copied()
      .filter(|l| l.starts_with("http"))
      .collect();
    title = "Remote stream".to_string();
  }

  let (video_url, extra) = urls.split_first()?;
  Some(ResolvedStream {
    title,
    video_url: video_url.to_string(),
    audio_url: extra.first().map(|u| u.to_string()),
  })
}

fn truncate(text: &str, max: usize) -> String {
  if text.len() <= max {
    text.to_string()
  } else {
    let mut end = max;
    while !text.is_char_boundary(end) {
      end -= 1;
    }
    text[..end].to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn title_then_separate_tracks() {
    let resolved =
      parse_output("Some Title\nhttps://cdn/video.m3u8\nhttps://cdn/audio.m4a\n").unwrap();
    assert_eq!(resolved.title, "Some Title");
    assert_eq!(resolved.video_url, "https://cdn/video.m3u8");
    assert_eq!(resolved.audio_url.as_deref(), Some("https://cdn/audio.m4a"));
  }

  #[test]
  fn title_then_single_url() {
    let resolved = parse_output("Combined\nhttp://cdn/av.mp4\n").unwrap();
    assert_eq!(resolved.audio_url, None);
  }

  #[test]
  fn urls_without_title_line() {
    let resolved = parse_output("https://cdn/only.mp4\n").unwrap();
    assert_eq!(resolved.title, "Remote stream");
    assert_eq!(resolved.video_url, "https://cdn/only.mp4");
  }

  #[test]
  fn no_urls_is_a_failure() {
    assert!(parse_output("Just a title\n").is_none());
    assert!(parse_output("").is_none());
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let text = "é".repeat(150);
    let cut = truncate(&text, MAX_ERROR_LEN);
    assert!(cut.len() <= MAX_ERROR_LEN);
    assert!(cut.chars().all(|c| c == 'é'));
  }
}
