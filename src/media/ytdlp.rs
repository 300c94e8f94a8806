use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{FetchMode, MediaFetcher, MediaInfo};
use crate::utils::{check_output_file, run_command};
use crate::{PipelineError, ProgressFn, Result};

const PROGRESS_TEMPLATE: &str = "download:%(progress._percent_str)s";

/// Media acquisition adapter backed by the yt-dlp binary
pub struct YtDlpFetcher {
    bin: String,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    fn fetch_args(mode: FetchMode, dest_dir: &Path) -> (Vec<String>, PathBuf) {
        match mode {
            FetchMode::Audio => {
                let template = dest_dir.join("audio.%(ext)s");
                let args = vec![
                    "--extract-audio".to_string(),
                    "--audio-format".to_string(),
                    "wav".to_string(),
                    // Whisper expects 16 kHz mono input
                    "--postprocessor-args".to_string(),
                    "ffmpeg:-ar 16000 -ac 1".to_string(),
                    "--format".to_string(),
                    "bestaudio/best".to_string(),
                    "--output".to_string(),
                    template.to_string_lossy().into_owned(),
                ];
                (args, dest_dir.join("audio.wav"))
            }
            FetchMode::Video => {
                let template = dest_dir.join("video.%(ext)s");
                let args = vec![
                    "--format".to_string(),
                    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
                    "--merge-output-format".to_string(),
                    "mp4".to_string(),
                    "--output".to_string(),
                    template.to_string_lossy().into_owned(),
                ];
                (args, dest_dir.join("video.mp4"))
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<MediaInfo> {
        tracing::debug!(url, "Probing video metadata");

        let mut cmd = Command::new(&self.bin);
        cmd.args(["--dump-json", "--no-playlist", url]);

        let output = run_command(&mut cmd, self.timeout)
            .await
            .map_err(|e| PipelineError::DownloadFailed(e.to_string()))?;

        if !output.status.success() {
            let detail = stderr_excerpt(&output.stderr);
            tracing::error!(url, %detail, "yt-dlp metadata probe failed");
            return Err(PipelineError::DownloadFailed(detail));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::DownloadFailed(format!("unreadable metadata: {}", e)))?;

        let video_id = info["id"]
            .as_str()
            .ok_or_else(|| PipelineError::DownloadFailed("metadata has no video id".to_string()))?
            .to_string();

        Ok(MediaInfo {
            video_id,
            title: info["title"].as_str().map(|s| s.to_string()),
            duration: info["duration"].as_f64(),
            thumbnail_url: info["thumbnail"].as_str().map(|s| s.to_string()),
        })
    }

    async fn fetch(
        &self,
        url: &str,
        mode: FetchMode,
        dest_dir: &Path,
        progress: ProgressFn,
    ) -> Result<PathBuf> {
        let (args, expected) = Self::fetch_args(mode, dest_dir);

        tracing::info!(url, ?mode, dest = %dest_dir.display(), "Starting download");

        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .args(["--no-playlist", "--newline", "--progress-template"])
            .arg(PROGRESS_TEMPLATE)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::DownloadFailed(format!("failed to spawn yt-dlp: {}", e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let watch_progress = async {
                if let Some(stdout) = stdout {
                    let mut lines = BufReader::new(stdout).lines();
                    let mut last = 0.0f32;
                    while let Ok(Some(line)) = lines.next_line().await {
                        if let Some(pct) = parse_progress_line(&line) {
                            // yt-dlp restarts its percentage per fragment;
                            // only ever report forward movement
                            if pct >= last {
                                last = pct;
                                progress(pct);
                            }
                        }
                    }
                }
            };

            let drain_stderr = async {
                let mut buf = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut buf).await;
                }
                buf
            };

            let (status, _, stderr_buf) =
                tokio::join!(child.wait(), watch_progress, drain_stderr);
            (status, stderr_buf)
        };

        let (status, stderr_buf) = match tokio::time::timeout(self.timeout, run).await {
            Ok(done) => done,
            Err(_) => {
                let _ = child.kill().await;
                tracing::error!(url, "yt-dlp timed out");
                return Err(PipelineError::DownloadFailed(format!(
                    "download timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let status = status
            .map_err(|e| PipelineError::DownloadFailed(format!("yt-dlp did not exit: {}", e)))?;

        if !status.success() {
            let detail = stderr_excerpt(stderr_buf.as_bytes());
            tracing::error!(url, %detail, "yt-dlp exited with failure");
            return Err(PipelineError::DownloadFailed(detail));
        }

        // The tool can report success and still leave nothing usable behind
        if !check_output_file(&expected) {
            tracing::error!(path = %expected.display(), "Downloaded file missing or empty");
            return Err(PipelineError::DownloadFailed(
                "出力ファイルが生成されませんでした".to_string(),
            ));
        }

        progress(100.0);
        tracing::info!(path = %expected.display(), "Download complete");

        Ok(expected)
    }
}

/// Parse a `--progress-template` stdout line into a percentage
fn parse_progress_line(line: &str) -> Option<f32> {
    let rest = line.trim().strip_prefix("download:")?;
    let pct = rest.trim().strip_suffix('%')?;
    pct.trim().parse::<f32>().ok().map(|p| p.clamp(0.0, 100.0))
}

/// Last non-empty stderr line, for user-facing download errors
fn stderr_excerpt(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("unknown downloader error")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("download:  12.3%"), Some(12.3));
        assert_eq!(parse_progress_line("download:100.0%"), Some(100.0));
        assert_eq!(parse_progress_line("download:   N/A"), None);
        assert_eq!(parse_progress_line("[youtube] extracting"), None);
        assert_eq!(parse_progress_line("download: 250.0%"), Some(100.0));
    }

    #[test]
    fn test_stderr_excerpt_takes_last_line() {
        let stderr = b"WARNING: something\nERROR: Unsupported URL: x\n\n";
        assert_eq!(stderr_excerpt(stderr), "ERROR: Unsupported URL: x");
        assert_eq!(stderr_excerpt(b""), "unknown downloader error");
    }

    #[test]
    fn test_fetch_args_name_deterministic_outputs() {
        let dir = Path::new("/tmp/job");
        let (_, audio) = YtDlpFetcher::fetch_args(FetchMode::Audio, dir);
        assert_eq!(audio, dir.join("audio.wav"));
        let (args, video) = YtDlpFetcher::fetch_args(FetchMode::Video, dir);
        assert_eq!(video, dir.join("video.mp4"));
        assert!(args.iter().any(|a| a == "mp4"));
    }

    #[tokio::test]
    async fn test_fetch_missing_binary_is_download_failure() {
        let fetcher = YtDlpFetcher::new("definitely-not-a-binary", Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher
            .fetch(
                "https://example.com/v",
                FetchMode::Audio,
                dir.path(),
                std::sync::Arc::new(|_| {}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DownloadFailed(_)));
    }
}
