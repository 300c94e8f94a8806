use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ProgressFn, Result};

pub mod model;
pub mod whisper;

/// Whisper model size selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// ggml weights filename for this size
    ///
    /// The upstream repository ships `large` as versioned files only.
    pub fn weights_file(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "ggml-tiny.bin",
            ModelSize::Base => "ggml-base.bin",
            ModelSize::Small => "ggml-small.bin",
            ModelSize::Medium => "ggml-medium.bin",
            ModelSize::Large => "ggml-large-v3.bin",
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            other => Err(format!("unknown model size: {}", other)),
        }
    }
}

/// A time-bounded span of recognized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Recognized text
    pub text: String,
}

/// Immutable output of one transcription run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full recognized text
    pub text: String,

    /// Segments in non-decreasing start order, as produced by the model
    pub segments: Vec<Segment>,

    /// Language the model detected in the source audio
    pub detected_language: String,

    /// Target language code echoed from the request, when translation ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

/// Adapter over a speech-to-text model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Transcribe the audio file at `audio_path`
    ///
    /// With no `target_language` the source language is transcribed with
    /// automatic detection; with one present the model's translate task runs
    /// instead (English is the only target the model supports). The input
    /// file is left in place. `progress` receives 0-100 for this stage.
    async fn transcribe<'a>(
        &self,
        audio_path: &Path,
        model: ModelSize,
        target_language: Option<&'a str>,
        progress: ProgressFn,
    ) -> Result<TranscriptionResult>;
}
