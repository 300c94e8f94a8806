use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::transcribe::Segment;
use crate::Result;

pub mod ffmpeg;

/// Screen position the subtitle track is composited at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtitlePosition {
    Top,
    Middle,
    #[default]
    Bottom,
}

impl SubtitlePosition {
    /// ASS numpad alignment value used by libass `force_style`
    pub fn ass_alignment(&self) -> u8 {
        match self {
            SubtitlePosition::Top => 8,
            SubtitlePosition::Middle => 5,
            SubtitlePosition::Bottom => 2,
        }
    }
}

/// Rendering style for burned-in subtitles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleStyle {
    /// Font size in points
    pub font_size: u32,

    /// Outline thickness in pixels
    pub outline: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        // White text with a black outline, matching the service defaults
        Self {
            font_size: 24,
            outline: 2,
        }
    }
}

/// Format seconds as an SRT timestamp, `HH:MM:SS,mmm`
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse an SRT timestamp back into seconds
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let (hms, millis) = value.split_once(',')?;
    let mut parts = hms.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let secs: u64 = parts.next()?.parse().ok()?;
    let millis: u64 = millis.parse().ok()?;

    Some((hours * 3600 + minutes * 60 + secs) as f64 + millis as f64 / 1000.0)
}

/// Serialize segments as an SRT subtitle track
pub fn render_srt(segments: &[Segment]) -> String {
    let mut srt = String::new();
    for (index, segment) in segments.iter().enumerate() {
        let _ = write!(
            srt,
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_timestamp(segment.start),
            format_timestamp(segment.end),
            segment.text.trim()
        );
    }
    srt
}

/// Write segments to an SRT file
pub fn write_srt(segments: &[Segment], path: &Path) -> Result<()> {
    fs_err::write(path, render_srt(segments)).map_err(|e| anyhow::Error::new(e).into())
}
