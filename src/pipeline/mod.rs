use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::media::{FetchMode, MediaFetcher};
use crate::progress::{JobEvent, ProgressRegistry, Stage};
use crate::subtitle::ffmpeg::SubtitleRenderer;
use crate::subtitle::{SubtitlePosition, SubtitleStyle};
use crate::transcribe::{ModelSize, SpeechTranscriber, TranscriptionResult};
use crate::{PipelineError, Result};

pub mod outputs;

pub use outputs::OutputStore;

/// One end-to-end request to transcribe and/or render subtitles for a video
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub url: String,
    pub model: ModelSize,
    /// Target language; any present value selects the translate task
    pub language: Option<String>,
    pub subtitle_position: SubtitlePosition,
}

/// Output of the full process pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    pub transcription: TranscriptionResult,
    pub video_path: PathBuf,
}

/// Derive the job identifier clients key their progress channel on
///
/// YouTube watch URLs use the `v=` query value, short URLs the last path
/// segment; anything else falls back to a random id.
pub fn job_id_for(url: &str) -> String {
    if let Some((_, rest)) = url.split_once("v=") {
        let id = rest.split('&').next().unwrap_or(rest);
        if !id.is_empty() {
            return id.to_string();
        }
    }

    if let Ok(parsed) = Url::parse(url) {
        if let Some(segment) = parsed.path_segments().and_then(|s| s.last()) {
            if !segment.is_empty() {
                return segment.to_string();
            }
        }
    }

    uuid::Uuid::new_v4().to_string()
}

/// Per-job stage/progress state, broadcast on every update
///
/// Progress never decreases within a stage; a stage transition may reset it.
struct JobTracker {
    job_id: String,
    registry: Arc<ProgressRegistry>,
    state: Mutex<(Stage, f32)>,
}

impl JobTracker {
    fn new(job_id: String, registry: Arc<ProgressRegistry>) -> Self {
        Self {
            job_id,
            registry,
            state: Mutex::new((Stage::Downloading, 0.0)),
        }
    }

    fn set(&self, stage: Stage, progress: f32) {
        let (stage, progress) = {
            let mut state = self.state.lock().expect("job tracker poisoned");
            if state.0 == stage {
                state.1 = state.1.max(progress);
            } else {
                *state = (stage, progress);
            }
            *state
        };
        self.registry
            .publish(&self.job_id, JobEvent::Status { stage, progress });
    }

    fn fail(&self, error: &PipelineError) {
        {
            let mut state = self.state.lock().expect("job tracker poisoned");
            state.0 = Stage::Failed;
        }
        self.registry.publish(
            &self.job_id,
            JobEvent::Error {
                error: error.to_string(),
            },
        );
    }
}

/// Sequences acquisition, transcription, and rendering for one job
///
/// The orchestrator recovers nothing: the first failure is forwarded after
/// best-effort cleanup of the job's temp dir, and broadcast on the job's
/// channel. There is no cancellation and no retry.
pub struct Pipeline {
    fetcher: Arc<dyn MediaFetcher>,
    transcriber: Arc<dyn SpeechTranscriber>,
    renderer: Arc<dyn SubtitleRenderer>,
    progress: Arc<ProgressRegistry>,
    outputs: Arc<OutputStore>,
    style: SubtitleStyle,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcriber: Arc<dyn SpeechTranscriber>,
        renderer: Arc<dyn SubtitleRenderer>,
        progress: Arc<ProgressRegistry>,
        outputs: Arc<OutputStore>,
        style: SubtitleStyle,
    ) -> Self {
        Self {
            fetcher,
            transcriber,
            renderer,
            progress,
            outputs,
            style,
        }
    }

    /// Transcribe-only pipeline: download audio, transcribe, clean up
    pub async fn transcribe(&self, request: &JobRequest) -> Result<TranscriptionResult> {
        let tracker = self.tracker_for(request);

        let result = async {
            crate::utils::validate_url(&request.url)?;
            let workdir = job_workdir()?;
            let transcription = self
                .transcribe_stages(request, &tracker, workdir.path())
                .await?;
            // workdir drops here, removing the downloaded audio
            Ok(transcription)
        }
        .await;

        match result {
            Ok(transcription) => {
                tracker.set(Stage::Complete, 100.0);
                Ok(transcription)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    /// Full pipeline: transcribe, download the video, burn subtitles
    pub async fn process(&self, request: &JobRequest) -> Result<ProcessOutput> {
        let tracker = self.tracker_for(request);

        let result = async {
            crate::utils::validate_url(&request.url)?;
            let workdir = job_workdir()?;

            let transcription = self
                .transcribe_stages(request, &tracker, workdir.path())
                .await?;

            // Rendering reports no percentage updates of its own
            tracker.set(Stage::Rendering, 100.0);

            let video = self
                .fetcher
                .fetch(
                    &request.url,
                    FetchMode::Video,
                    workdir.path(),
                    Arc::new(|_| {}),
                )
                .await?;

            let rendered = self
                .renderer
                .burn(
                    &video,
                    &transcription.segments,
                    request.subtitle_position,
                    &self.style,
                    workdir.path(),
                )
                .await?;

            // Retain the result before the temp dir (and everything the
            // stages produced) is removed
            let video_path = self.outputs.put(&tracker.job_id, &rendered)?;

            Ok(ProcessOutput {
                transcription,
                video_path,
            })
        }
        .await;

        match result {
            Ok(output) => {
                tracker.set(Stage::Complete, 100.0);
                Ok(output)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    fn tracker_for(&self, request: &JobRequest) -> Arc<JobTracker> {
        Arc::new(JobTracker::new(
            job_id_for(&request.url),
            Arc::clone(&self.progress),
        ))
    }

    /// Shared download + transcription stages
    ///
    /// Download occupies the lower half of the composite percentage,
    /// transcription the upper half.
    async fn transcribe_stages(
        &self,
        request: &JobRequest,
        tracker: &Arc<JobTracker>,
        workdir: &Path,
    ) -> Result<TranscriptionResult> {
        tracker.set(Stage::Downloading, 0.0);

        let t = Arc::clone(tracker);
        let audio = self
            .fetcher
            .fetch(
                &request.url,
                FetchMode::Audio,
                workdir,
                Arc::new(move |pct| t.set(Stage::Downloading, pct * 0.5)),
            )
            .await?;

        tracker.set(Stage::Transcribing, 50.0);

        let t = Arc::clone(tracker);
        let transcription = self
            .transcriber
            .transcribe(
                &audio,
                request.model,
                request.language.as_deref(),
                Arc::new(move |pct| t.set(Stage::Transcribing, 50.0 + pct * 0.5)),
            )
            .await?;

        Ok(transcription)
    }
}

/// Fresh temporary directory owned by one job
fn job_workdir() -> Result<tempfile::TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("telop-job-")
        .tempdir()
        .context("Failed to create job temp directory")?;
    Ok(dir)
}
