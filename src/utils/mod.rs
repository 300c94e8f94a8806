use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use url::Url;

use crate::PipelineError;

/// Validate a video URL
///
/// Empty strings, unparsable URLs, and non-http(s) schemes are all rejected
/// with the same user-facing error.
pub fn validate_url(url: &str) -> Result<Url, PipelineError> {
    if url.trim().is_empty() {
        return Err(PipelineError::InvalidInput);
    }

    let parsed = Url::parse(url).map_err(|_| PipelineError::InvalidInput)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PipelineError::InvalidInput);
    }

    Ok(parsed)
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Check if a file exists and is non-empty
pub fn check_output_file(path: &Path) -> bool {
    fs_err::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Run an external command to completion with a bounded timeout
///
/// stdout/stderr are captured; the child is killed if the timeout elapses or
/// the future is dropped. Callers map failures to their own error kind.
pub async fn run_command(
    cmd: &mut tokio::process::Command,
    timeout: Duration,
) -> Result<std::process::Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(output) => Ok(output?),
        Err(_) => anyhow::bail!("command timed out after {}s", timeout.as_secs()),
    }
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp: &str, ffmpeg: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp).await {
        missing.push(format!("{} - required for video/audio download", yt_dlp));
    }

    if !check_command_available(ffmpeg).await {
        missing.push(format!(
            "{} - required for audio decoding and subtitle burn-in",
            ffmpeg
        ));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
