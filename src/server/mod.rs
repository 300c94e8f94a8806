//! HTTP and WebSocket surface
//!
//! A thin axum layer over the pipeline: JSON endpoints for probing,
//! transcribing, and processing a video, a streaming download endpoint for
//! rendered results, and a per-job WebSocket pushing progress events.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::media::MediaFetcher;
use crate::pipeline::{OutputStore, Pipeline};
use crate::progress::ProgressRegistry;
use crate::PipelineError;

pub mod routes;
pub mod ws;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub progress: Arc<ProgressRegistry>,
    pub outputs: Arc<OutputStore>,
}

/// Build the application router with CORS and request tracing
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/", get(routes::root_handler))
        .route("/api/video/info", post(routes::video_info_handler))
        .route("/api/video/transcribe", post(routes::transcribe_handler))
        .route("/api/video/process", post(routes::process_handler))
        .route(
            "/api/video/download/{video_id}",
            get(routes::download_handler),
        )
        .route("/ws/{video_id}", get(ws::progress_socket_handler))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        // Internal detail is logged; the client only sees the localized message
        if let PipelineError::Unexpected(e) = &self {
            tracing::error!(error = ?e, "Unexpected pipeline error");
        }

        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
