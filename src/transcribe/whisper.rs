use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::model::ModelCache;
use super::{ModelSize, Segment, SpeechTranscriber, TranscriptionResult};
use crate::utils::run_command;
use crate::{PipelineError, ProgressFn, Result};

const WEIGHTS_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Whisper timestamps are expressed in 10ms ticks
const TICKS_PER_SECOND: f64 = 100.0;

/// A loaded whisper.cpp context, shared across jobs once cached
pub struct LoadedModel {
    ctx: WhisperContext,
}

/// Transcription adapter backed by whisper-rs
///
/// Model weights are resolved under `models_dir` and fetched from the
/// upstream ggml repository on first use of a size. Audio is decoded to
/// 16 kHz mono f32 PCM through ffmpeg before inference.
pub struct WhisperTranscriber {
    models: ModelCache<LoadedModel>,
    models_dir: PathBuf,
    ffmpeg: String,
    decode_timeout: Duration,
    use_gpu: bool,
    num_threads: i32,
    http: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(
        models_dir: PathBuf,
        ffmpeg: impl Into<String>,
        decode_timeout: Duration,
        use_gpu: bool,
        num_threads: i32,
    ) -> Self {
        Self {
            models: ModelCache::new(),
            models_dir,
            ffmpeg: ffmpeg.into(),
            decode_timeout,
            use_gpu,
            num_threads,
            http: reqwest::Client::new(),
        }
    }

    /// Number of model loads performed, for instrumentation
    pub fn model_loads(&self) -> usize {
        self.models.load_count()
    }

    /// Make sure the ggml weights for `size` exist locally
    async fn ensure_weights(&self, size: ModelSize) -> Result<PathBuf> {
        let load_err = |reason: String| PipelineError::ModelLoadFailed {
            model: size,
            reason,
        };

        let path = self.models_dir.join(size.weights_file());
        if fs_err::metadata(&path).map(|m| m.len() > 0).unwrap_or(false) {
            return Ok(path);
        }

        fs_err::create_dir_all(&self.models_dir).map_err(|e| load_err(e.to_string()))?;

        let url = weights_url(size);
        tracing::info!(model = %size, %url, "Downloading model weights");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| load_err(e.to_string()))?;

        // Stream into a partial file so an interrupted download never leaves
        // a truncated weights file behind
        let part = path.with_extension("bin.part");
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| load_err(e.to_string()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| load_err(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| load_err(e.to_string()))?;
        }
        file.flush().await.map_err(|e| load_err(e.to_string()))?;
        drop(file);

        fs_err::rename(&part, &path).map_err(|e| load_err(e.to_string()))?;

        tracing::info!(model = %size, path = %path.display(), "Model weights ready");
        Ok(path)
    }

    /// Load a whisper context for `size`, downloading weights if needed
    async fn load_model(&self, size: ModelSize) -> Result<LoadedModel> {
        let path = self.ensure_weights(size).await?;
        let use_gpu = self.use_gpu;

        let ctx = tokio::task::spawn_blocking(move || {
            let mut ctx_params = WhisperContextParameters::default();
            ctx_params.use_gpu(use_gpu);

            let path_str = path
                .to_str()
                .ok_or_else(|| "model path is not valid UTF-8".to_string())?;

            WhisperContext::new_with_params(path_str, ctx_params).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| PipelineError::Unexpected(anyhow::Error::new(e)))?
        .map_err(|reason| PipelineError::ModelLoadFailed {
            model: size,
            reason,
        })?;

        Ok(LoadedModel { ctx })
    }

    /// Decode an audio file to 16 kHz mono f32 samples via ffmpeg
    async fn decode_audio(&self, audio_path: &Path) -> Result<Vec<f32>> {
        let mut cmd = tokio::process::Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(audio_path)
            .args(["-f", "f32le", "-acodec", "pcm_f32le", "-ac", "1", "-ar", "16000", "-"]);

        let output = run_command(&mut cmd, self.decode_timeout)
            .await
            .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(path = %audio_path.display(), %stderr, "ffmpeg audio decode failed");
            return Err(PipelineError::TranscriptionFailed(
                "音声のデコードに失敗しました".to_string(),
            ));
        }

        let samples = bytes_to_samples(&output.stdout);
        if samples.is_empty() {
            return Err(PipelineError::TranscriptionFailed(
                "音声データが空です".to_string(),
            ));
        }

        Ok(samples)
    }
}

#[async_trait]
impl SpeechTranscriber for WhisperTranscriber {
    async fn transcribe<'a>(
        &self,
        audio_path: &Path,
        model: ModelSize,
        target_language: Option<&'a str>,
        progress: ProgressFn,
    ) -> Result<TranscriptionResult> {
        let loaded = self
            .models
            .get_or_load(model, || self.load_model(model))
            .await?;

        let samples = self.decode_audio(audio_path).await?;

        // Any present target selects the translate task; whisper only
        // translates into English regardless of the requested code
        let translate = target_language.is_some();
        if let Some(lang) = target_language {
            if lang != "en" {
                tracing::warn!(
                    requested = lang,
                    "Model translation target is fixed to English"
                );
            }
        }

        tracing::info!(
            model = %model,
            translate,
            samples = samples.len(),
            "Starting transcription"
        );

        let num_threads = self.num_threads;
        let progress_cb = Arc::clone(&progress);

        let (text, segments, lang_id) =
            tokio::task::spawn_blocking(move || -> Result<(String, Vec<Segment>, i32)> {
                let failed = |e: whisper_rs::WhisperError| {
                    PipelineError::TranscriptionFailed(e.to_string())
                };

                let mut state = loaded.ctx.create_state().map_err(failed)?;

                let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
                params.set_language(Some("auto"));
                params.set_translate(translate);
                params.set_print_special(false);
                params.set_print_progress(false);
                params.set_print_realtime(false);
                params.set_print_timestamps(false);
                params.set_n_threads(num_threads);
                params.set_progress_callback_safe(move |pct: i32| {
                    progress_cb(pct.clamp(0, 100) as f32);
                });

                state.full(params, &samples).map_err(failed)?;

                let num_segments = state.full_n_segments().map_err(failed)?;
                let mut text = String::new();
                let mut segments = Vec::with_capacity(num_segments as usize);

                for i in 0..num_segments {
                    let segment_text = state.full_get_segment_text(i).map_err(failed)?;
                    let start = state.full_get_segment_t0(i).map_err(failed)?;
                    let end = state.full_get_segment_t1(i).map_err(failed)?;

                    text.push_str(&segment_text);
                    segments.push(Segment {
                        start: start as f64 / TICKS_PER_SECOND,
                        end: end as f64 / TICKS_PER_SECOND,
                        text: segment_text.trim().to_string(),
                    });
                }

                let lang_id = state.full_lang_id_from_state().map_err(failed)?;

                Ok((text.trim().to_string(), segments, lang_id))
            })
            .await
            .map_err(|e| PipelineError::Unexpected(anyhow::Error::new(e)))??;

        let detected_language = whisper_rs::get_lang_str(lang_id)
            .unwrap_or("unknown")
            .to_string();

        tracing::info!(
            segments = segments.len(),
            detected_language = %detected_language,
            "Transcription complete"
        );

        Ok(TranscriptionResult {
            text,
            segments,
            detected_language,
            target_language: target_language.map(|s| s.to_string()),
        })
    }
}

fn weights_url(size: ModelSize) -> String {
    format!("{}/{}", WEIGHTS_BASE_URL, size.weights_file())
}

/// Reinterpret little-endian f32 PCM bytes as samples
fn bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_samples() {
        let bytes: Vec<u8> = [0.5f32, -1.0, 0.0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(bytes_to_samples(&bytes), vec![0.5, -1.0, 0.0]);

        // Trailing partial sample is dropped
        let mut truncated = bytes.clone();
        truncated.push(0xFF);
        assert_eq!(bytes_to_samples(&truncated).len(), 3);
    }

    #[test]
    fn test_weights_url() {
        assert_eq!(
            weights_url(ModelSize::Tiny),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin"
        );
        assert!(weights_url(ModelSize::Large).ends_with("ggml-large-v3.bin"));
    }
}
