//! Local media library: scanning, uploads and deletion under one root.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use walkdir::WalkDir;

use crate::session::{ControllerError, MediaKind};

/// One file in the library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
  pub name: String,
  pub path: String,
  pub relative_path: String,
  pub size: u64,
  pub modified: u64,
}

/// Scan result, bucketed by kind.
#[derive(Debug, Default, Serialize)]
pub struct Library {
  pub video: Vec<LibraryEntry>,
  pub audio: Vec<LibraryEntry>,
  pub image: Vec<LibraryEntry>,
}

/// Where an upload of a given kind lands.
fn category_dir(kind: MediaKind) -> Option<&'static str> {
  match kind {
    MediaKind::Video => Some("videos"),
    MediaKind::Audio => Some("music"),
    MediaKind::Image => Some("photos"),
    _ => None,
  }
}

/// Manages the on-disk media library.
pub struct LibraryManager {
  media_dir: PathBuf,
}

impl LibraryManager {
  pub fn new(media_dir: PathBuf) -> Self {
    Self { media_dir }
  }

  /// Create the media root and its category subdirectories.
  pub fn ensure_dirs(&self) -> std::io::Result<()> {
    std::fs::create_dir_all(&self.media_dir)?;
    for dir in ["videos", "music", "photos"] {
      std::fs::create_dir_all(self.media_dir.join(dir))?;
    }
    Ok(())
  }

  /// Recursively scan the media root.
  pub fn scan(&self) -> Library {
    let mut library = Library::default();

    for entry in WalkDir::new(&self.media_dir)
      .into_iter()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_type().is_file())
    {
      let path = entry.path();
      let Some(kind) = MediaKind::classify(path) else {
        continue;
      };
      let Ok(meta) = entry.metadata() else {
        continue;
      };

      let item = LibraryEntry {
        name: entry.file_name().to_string_lossy().into_owned(),
        path: path.display().to_string(),
        relative_path: path
          .strip_prefix(&self.media_dir)
          .unwrap_or(path)
          .display()
          .to_string(),
        size: meta.len(),
        modified: meta
          .modified()
          .ok()
          .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
          .map(|d| d.as_secs())
          .unwrap_or(0),
      };

      match kind {
        MediaKind::Video => library.video.push(item),
        MediaKind::Audio => library.audio.push(item),
        MediaKind::Image => library.image.push(item),
        _ => {}
      }
    }

    for bucket in [
      &mut library.video,
      &mut library.audio,
      &mut library.image,
    ] {
      bucket.sort_by_key(|item| item.name.to_lowercase());
    }
    library
  }

  /// Delete a file addressed relative to the media root.
  pub fn delete(&self, relative_path: &str) -> Result<(), ControllerError> {
    let path = self.media_dir.join(relative_path);
    if !path.exists() {
      return Err(ControllerError::NotFound);
    }

    let resolved = path
      .canonicalize()
      .map_err(|_| ControllerError::PathDenied)?;
    let root = self
      .media_dir
      .canonicalize()
      .map_err(|_| ControllerError::PathDenied)?;
    if !resolved.starts_with(&root) {
      return Err(ControllerError::PathDenied);
    }

    std::fs::remove_file(&resolved).map_err(|e| {
      log::warn!("Delete failed for {:?}: {}", resolved, e);
      ControllerError::NotFound
    })
  }

  /// Store an uploaded file under its category directory. Duplicate names
  /// get a `_1`, `_2`, ... suffix.
  pub fn save_upload(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ControllerError> {
    let name = sanitize_filename(filename).ok_or(ControllerError::PathDenied)?;
    let kind = MediaKind::classify(Path::new(&name)).ok_or(ControllerError::UnknownType)?;
    let category = category_dir(kind).ok_or(ControllerError::UnknownType)?;

    let dir = self.media_dir.join(category);
    std::fs::create_dir_all(&dir).map_err(|_| ControllerError::PathDenied)?;

    let mut target = dir.join(&name);
    let stem = Path::new(&name)
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| name.clone());
    let ext = Path::new(&name)
      .extension()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();

    let mut counter = 1;
    while target.exists() {
      target = dir.join(format!("{}_{}.{}", stem, counter, ext));
      counter += 1;
    }

    std::fs::write(&target, bytes).map_err(|e| {
      log::error!("Upload write failed for {:?}: {}", target, e);
      ControllerError::PathDenied
    })?;
    log::info!("Stored upload {:?} ({} bytes)", target, bytes.len());
    Ok(target)
  }
}

/// Reduce an untrusted upload name to a bare file name.
fn sanitize_filename(raw: &str) -> Option<String> {
  let name = Path::new(raw).file_name()?.to_string_lossy();
  let name: String = name
    .chars()
    .filter(|c| !matches!(c, '/' | '\\' | '\0'))
    .collect();
  let name = name.trim_matches('.').trim();
  if name.is_empty() {
    None
  } else {
    Some(name.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn library() -> (tempfile::TempDir, LibraryManager) {
    let dir = tempfile::tempdir().unwrap();
    let manager = LibraryManager::new(dir.path().to_path_buf());
    manager.ensure_dirs().unwrap();
    (dir, manager)
  }

  #[test]
  fn scan_buckets_and_sorts() {
    let (_dir, manager) = library();
    std::fs::write(manager.media_dir.join("videos/b.mp4"), b"x").unwrap();
    std::fs::write(manager.media_dir.join("videos/A.mkv"), b"x").unwrap();
    std::fs::write(manager.media_dir.join("music/song.mp3"), b"x").unwrap();
    std::fs::write(manager.media_dir.join("notes.txt"), b"x").unwrap();

    let result = manager.scan();
    assert_eq!(result.video.len(), 2);
    assert_eq!(result.video[0].name, "A.mkv");
    assert_eq!(result.audio.len(), 1);
    assert_eq!(result.audio[0].relative_path, "music/song.mp3");
    assert!(result.image.is_empty());
  }

  #[test]
  fn delete_refuses_escape() {
    let (_dir, manager) = library();
    assert!(matches!(
      manager.delete("../outside.mp4"),
      Err(ControllerError::NotFound | ControllerError::PathDenied)
    ));
    assert!(matches!(
      manager.delete("missing.mp4"),
      Err(ControllerError::NotFound)
    ));
  }

  #[test]
  fn delete_removes_file() {
    let (_dir, manager) = library();
    let path = manager.media_dir.join("videos/gone.mp4");
    std::fs::write(&path, b"x").unwrap();
    manager.delete("videos/gone.mp4").unwrap();
    assert!(!path.exists());
  }

  #[test]
  fn upload_categorizes_and_dedups() {
    let (_dir, manager) = library();
    let first = manager.save_upload("clip.mp4", b"a").unwrap();
    assert!(first.ends_with("videos/clip.mp4"));
    let second = manager.save_upload("clip.mp4", b"b").unwrap();
    assert!(second.ends_with("videos/clip_1.mp4"));
  }

  #[test]
  fn upload_rejects_unknown_and_traversal() {
    let (_dir, manager) = library();
    assert!(matches!(
      manager.save_upload("virus.exe", b"x"),
      Err(ControllerError::UnknownType)
    ));
    // A traversal attempt is reduced to its file name, not rejected.
    let stored = manager.save_upload("../../etc/passwd.png", b"x").unwrap();
    assert!(stored.ends_with("photos/passwd.png"));
    assert!(matches!(
      manager.save_upload("...", b"x"),
      Err(ControllerError::PathDenied)
    ));
  }
}
