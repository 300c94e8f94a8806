use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "telop",
    about = "Telop - transcribe videos with Whisper and burn subtitles with ffmpeg",
    version,
    long_about = "A self-hosted backend service that downloads a video with yt-dlp, \
transcribes it with a locally loaded Whisper model, optionally burns the transcript \
into the video with ffmpeg, and streams progress to clients over WebSocket."
)]
pub struct Cli {
    /// Bind address (overrides the config file)
    #[arg(long, env = "TELOP_HOST", value_name = "HOST")]
    pub host: Option<String>,

    /// Bind port (overrides the config file)
    #[arg(short, long, env = "TELOP_PORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding ggml model weights (overrides the config file)
    #[arg(long, env = "TELOP_MODELS_DIR", value_name = "DIR")]
    pub models_dir: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.models_dir {
            config.whisper.models_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from(["telop", "--host", "0.0.0.0", "-p", "9000"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["telop"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
    }
}
