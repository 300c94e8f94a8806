use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ProgressFn, Result};

pub mod ytdlp;

/// What to pull out of the source URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Full video merged to mp4
    Video,
    /// Audio track extracted to 16 kHz mono WAV
    Audio,
}

/// Metadata about a remote video, as reported by the downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Platform identifier of the video
    pub video_id: String,

    /// Title if available
    pub title: Option<String>,

    /// Duration in seconds if available
    pub duration: Option<f64>,

    /// Thumbnail URL if available
    pub thumbnail_url: Option<String>,
}

/// Adapter over an external video/audio downloader
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Query metadata without downloading anything
    async fn probe(&self, url: &str) -> Result<MediaInfo>;

    /// Download the requested media into `dest_dir`
    ///
    /// Returns the path of the produced file, which is guaranteed to exist
    /// and be non-empty on success. `progress` receives monotonically
    /// non-decreasing percentages while bytes are transferred.
    async fn fetch(
        &self,
        url: &str,
        mode: FetchMode,
        dest_dir: &Path,
        progress: ProgressFn,
    ) -> Result<PathBuf>;
}
