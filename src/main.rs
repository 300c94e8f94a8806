use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telop::cli::Cli;
use telop::config::Config;
use telop::media::ytdlp::YtDlpFetcher;
use telop::pipeline::{OutputStore, Pipeline};
use telop::progress::ProgressRegistry;
use telop::server::{create_router, AppState};
use telop::subtitle::ffmpeg::FfmpegRenderer;
use telop::subtitle::SubtitleStyle;
use telop::transcribe::whisper::WhisperTranscriber;
use telop::utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.clone()).await?;
    cli.apply(&mut config);

    // Missing tools are a warning, not a hard failure (they may appear later
    // in container environments)
    let missing = utils::check_dependencies(&config.tools.yt_dlp_path, &config.tools.ffmpeg_path).await;
    for dep in &missing {
        tracing::warn!("Missing external tool: {}", dep);
    }

    let fetcher = Arc::new(YtDlpFetcher::new(
        config.tools.yt_dlp_path.clone(),
        Duration::from_secs(config.tools.download_timeout_secs),
    ));
    let transcriber = Arc::new(WhisperTranscriber::new(
        config.models_dir()?,
        config.tools.ffmpeg_path.clone(),
        Duration::from_secs(config.tools.decode_timeout_secs),
        config.whisper.use_gpu,
        config.whisper.num_threads,
    ));
    let renderer = Arc::new(FfmpegRenderer::new(
        config.tools.ffmpeg_path.clone(),
        Duration::from_secs(config.tools.render_timeout_secs),
    ));
    let progress = Arc::new(ProgressRegistry::new());
    let outputs = Arc::new(OutputStore::new(config.output_dir())?);

    let style = SubtitleStyle {
        font_size: config.app.subtitle_font_size,
        ..SubtitleStyle::default()
    };

    let pipeline = Arc::new(Pipeline::new(
        fetcher.clone(),
        transcriber,
        renderer,
        Arc::clone(&progress),
        Arc::clone(&outputs),
        style,
    ));

    let state = AppState {
        pipeline,
        fetcher,
        progress,
        outputs: Arc::clone(&outputs),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Rendered videos are kept only for the lifetime of the process
    outputs.clear();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
