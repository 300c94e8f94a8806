use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use super::{write_srt, SubtitlePosition, SubtitleStyle};
use crate::transcribe::Segment;
use crate::utils::{check_output_file, run_command};
use crate::{PipelineError, Result};

/// Adapter over an external media encoder that burns subtitles into a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubtitleRenderer: Send + Sync {
    /// Burn `segments` into `video`, producing a new file under `workdir`
    ///
    /// The returned path exists only on success. The encoder's diagnostics
    /// are logged, never surfaced verbatim to the client.
    async fn burn(
        &self,
        video: &Path,
        segments: &[Segment],
        position: SubtitlePosition,
        style: &SubtitleStyle,
        workdir: &Path,
    ) -> Result<PathBuf>;
}

/// Subtitle renderer backed by the ffmpeg binary
pub struct FfmpegRenderer {
    bin: String,
    timeout: Duration,
}

impl FfmpegRenderer {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SubtitleRenderer for FfmpegRenderer {
    async fn burn(
        &self,
        video: &Path,
        segments: &[Segment],
        position: SubtitlePosition,
        style: &SubtitleStyle,
        workdir: &Path,
    ) -> Result<PathBuf> {
        let srt_path = workdir.join("subtitles.srt");
        write_srt(segments, &srt_path)?;

        let output_path = workdir.join("output_with_subtitles.mp4");
        let filter = subtitles_filter(&srt_path, position, style);

        tracing::info!(
            video = %video.display(),
            segments = segments.len(),
            ?position,
            "Burning subtitles"
        );

        let mut cmd = Command::new(&self.bin);
        cmd.arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-vf")
            .arg(&filter)
            // Audio is passed through untouched
            .args(["-c:a", "copy"])
            .arg(&output_path);

        let output = run_command(&mut cmd, self.timeout).await.map_err(|e| {
            tracing::error!(error = %e, "ffmpeg invocation failed");
            PipelineError::RenderFailed
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(%stderr, "ffmpeg exited with failure");
            return Err(PipelineError::RenderFailed);
        }

        if !check_output_file(&output_path) {
            tracing::error!(path = %output_path.display(), "Rendered file missing or empty");
            return Err(PipelineError::RenderFailed);
        }

        tracing::info!(path = %output_path.display(), "Render complete");
        Ok(output_path)
    }
}

/// Build the libass `subtitles` filter argument
fn subtitles_filter(srt_path: &Path, position: SubtitlePosition, style: &SubtitleStyle) -> String {
    format!(
        "subtitles={}:force_style='Alignment={},FontSize={},PrimaryColour=&HFFFFFF&,OutlineColour=&H000000&,Outline={}'",
        srt_path.display(),
        position.ass_alignment(),
        style.font_size,
        style.outline
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitles_filter() {
        let filter = subtitles_filter(
            Path::new("/tmp/job/subtitles.srt"),
            SubtitlePosition::Top,
            &SubtitleStyle::default(),
        );
        assert_eq!(
            filter,
            "subtitles=/tmp/job/subtitles.srt:force_style='Alignment=8,FontSize=24,\
             PrimaryColour=&HFFFFFF&,OutlineColour=&H000000&,Outline=2'"
        );
    }

    #[tokio::test]
    async fn test_burn_failure_reports_render_failed() {
        let renderer = FfmpegRenderer::new("definitely-not-ffmpeg", Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("video.mp4");
        fs_err::write(&video, b"not a real video").unwrap();

        let err = renderer
            .burn(
                &video,
                &[Segment {
                    start: 0.0,
                    end: 1.0,
                    text: "hi".to_string(),
                }],
                SubtitlePosition::Bottom,
                &SubtitleStyle::default(),
                dir.path(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::RenderFailed));
        // The subtitle track is still written before the encoder runs
        assert!(dir.path().join("subtitles.srt").exists());
    }
}
