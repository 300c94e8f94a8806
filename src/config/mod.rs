use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transcribe::ModelSize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// External tool settings
    pub tools: ToolsConfig,

    /// Whisper model settings
    pub whisper: WhisperConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp binary
    pub yt_dlp_path: String,

    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,

    /// Timeout for a single download invocation
    pub download_timeout_secs: u64,

    /// Timeout for decoding one audio file to PCM
    pub decode_timeout_secs: u64,

    /// Timeout for a single render invocation
    pub render_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    /// Directory holding ggml model weights (defaults to the user cache dir)
    pub models_dir: Option<PathBuf>,

    /// Model used when a request does not specify one
    pub default_model: ModelSize,

    /// Offload inference to the GPU when the build supports it
    pub use_gpu: bool,

    /// Threads used per inference run
    pub num_threads: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for retained rendered videos (defaults to a temp subdir)
    pub output_dir: Option<PathBuf>,

    /// Default subtitle font size
    pub subtitle_font_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            tools: ToolsConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                ffmpeg_path: "ffmpeg".to_string(),
                download_timeout_secs: 600,
                decode_timeout_secs: 120,
                render_timeout_secs: 600,
            },
            whisper: WhisperConfig {
                models_dir: None,
                default_model: ModelSize::Base,
                use_gpu: false,
                num_threads: 4,
            },
            app: AppConfig {
                output_dir: None,
                subtitle_font_size: 24,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("telop").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.tools.download_timeout_secs == 0
            || self.tools.decode_timeout_secs == 0
            || self.tools.render_timeout_secs == 0
        {
            anyhow::bail!("Tool timeouts must be greater than zero");
        }

        if self.whisper.num_threads <= 0 {
            anyhow::bail!("Whisper thread count must be greater than zero");
        }

        Ok(())
    }

    /// Directory holding model weights
    pub fn models_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.whisper.models_dir {
            return Ok(dir.clone());
        }

        let cache_dir = dirs::cache_dir().context("Could not determine cache directory")?;

        Ok(cache_dir.join("telop").join("models"))
    }

    /// Directory for retained rendered videos
    pub fn output_dir(&self) -> PathBuf {
        self.app
            .output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("telop-outputs"))
    }
}
