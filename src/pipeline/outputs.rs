use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::utils::sanitize_filename;
use crate::Result;

/// Retained rendered videos, keyed by job id
///
/// Rendered files outlive their job's temp dir: they are copied here and kept
/// until replaced, or until `clear` runs at shutdown.
pub struct OutputStore {
    dir: PathBuf,
    entries: Mutex<HashMap<String, PathBuf>>,
}

impl OutputStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs_err::create_dir_all(&dir).context("Failed to create output directory")?;
        Ok(Self {
            dir,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Retain a rendered video for `video_id`, replacing any previous one
    pub fn put(&self, video_id: &str, src: &Path) -> Result<PathBuf> {
        let dest = self
            .dir
            .join(format!("{}_with_subtitles.mp4", sanitize_filename(video_id)));

        fs_err::copy(src, &dest).context("Failed to retain rendered video")?;

        self.entries
            .lock()
            .expect("output store poisoned")
            .insert(video_id.to_string(), dest.clone());

        Ok(dest)
    }

    /// Path of the retained video for `video_id`, if any
    pub fn get(&self, video_id: &str) -> Option<PathBuf> {
        self.entries
            .lock()
            .expect("output store poisoned")
            .get(video_id)
            .cloned()
    }

    /// Remove all retained videos
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("output store poisoned");
        for (video_id, path) in entries.drain() {
            if let Err(e) = fs_err::remove_file(&path) {
                tracing::warn!(video_id, error = %e, "Failed to remove retained video");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs")).unwrap();

        let src = dir.path().join("rendered.mp4");
        fs_err::write(&src, b"video bytes").unwrap();

        let retained = store.put("abc123", &src).unwrap();
        assert!(retained.exists());
        assert_eq!(store.get("abc123"), Some(retained.clone()));
        assert_eq!(store.get("missing"), None);

        store.clear();
        assert!(!retained.exists());
        assert_eq!(store.get("abc123"), None);
    }

    #[test]
    fn test_put_sanitizes_video_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs")).unwrap();

        let src = dir.path().join("rendered.mp4");
        fs_err::write(&src, b"x").unwrap();

        let retained = store.put("../evil/id", &src).unwrap();
        assert!(retained.starts_with(dir.path().join("outputs")));
    }
}
