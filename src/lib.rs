//! Telop - a self-hosted video transcription and subtitle burn-in service
//!
//! This library wires a small asynchronous pipeline: download a video or its
//! audio track with yt-dlp, transcribe it with a locally loaded Whisper model,
//! optionally burn the transcript into the video with ffmpeg, and stream
//! stage/progress events to a client over a WebSocket.

pub mod cli;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod subtitle;
pub mod transcribe;
pub mod utils;

pub use config::Config;
pub use media::{FetchMode, MediaFetcher, MediaInfo};
pub use pipeline::{JobRequest, Pipeline};
pub use transcribe::{ModelSize, Segment, TranscriptionResult};

/// Result type used throughout the library
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Progress callback invoked with a 0-100 percentage for the current stage
pub type ProgressFn = std::sync::Arc<dyn Fn(f32) + Send + Sync>;

/// Error taxonomy surfaced to clients
///
/// Display strings are the user-facing (Japanese) messages; internal detail
/// carried by the variants is logged, not necessarily echoed to the client.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("無効な動画URLです")]
    InvalidInput,

    #[error("動画のダウンロードに失敗しました: {0}")]
    DownloadFailed(String),

    #[error("モデル '{model}' の読み込みに失敗しました: {reason}")]
    ModelLoadFailed {
        model: transcribe::ModelSize,
        reason: String,
    },

    #[error("文字起こしに失敗しました: {0}")]
    TranscriptionFailed(String),

    #[error("字幕の追加に失敗しました")]
    RenderFailed,

    #[error("予期せぬエラーが発生しました")]
    Unexpected(#[from] anyhow::Error),
}

impl PipelineError {
    /// HTTP status this error surfaces with
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Unexpected(_) => 500,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message() {
        assert_eq!(PipelineError::InvalidInput.to_string(), "無効な動画URLです");
        assert_eq!(PipelineError::InvalidInput.status_code(), 400);
    }

    #[test]
    fn test_unexpected_is_server_error() {
        let err = PipelineError::Unexpected(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "予期せぬエラーが発生しました");
    }

    #[test]
    fn test_model_load_failed_names_model() {
        let err = PipelineError::ModelLoadFailed {
            model: transcribe::ModelSize::Tiny,
            reason: "no weights".to_string(),
        };
        assert!(err.to_string().contains("tiny"));
    }
}
