use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::media::MediaInfo;
use crate::pipeline::JobRequest;
use crate::subtitle::SubtitlePosition;
use crate::transcribe::{ModelSize, TranscriptionResult};
use crate::utils::sanitize_filename;
use crate::Result;

use super::AppState;

/// Request body shared by the info, transcribe, and process endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct VideoRequest {
    pub url: String,

    /// Present value selects the translate task
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub subtitle_position: SubtitlePosition,

    #[serde(default)]
    pub model: ModelSize,
}

impl VideoRequest {
    fn to_job(&self) -> JobRequest {
        JobRequest {
            url: self.url.clone(),
            model: self.model,
            language: self.language.clone(),
            subtitle_position: self.subtitle_position,
        }
    }
}

/// `GET /` liveness probe
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Telop Transcription API"
    }))
}

/// `POST /api/video/info` queries metadata without downloading
pub async fn video_info_handler(
    State(state): State<AppState>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<MediaInfo>> {
    crate::utils::validate_url(&request.url)?;
    let info = state.fetcher.probe(&request.url).await?;
    Ok(Json(info))
}

/// `POST /api/video/transcribe` runs the transcribe-only pipeline
pub async fn transcribe_handler(
    State(state): State<AppState>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<TranscriptionResult>> {
    let result = state.pipeline.transcribe(&request.to_job()).await?;
    Ok(Json(result))
}

/// `POST /api/video/process` runs the full transcribe-and-render pipeline
pub async fn process_handler(
    State(state): State<AppState>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<serde_json::Value>> {
    let output = state.pipeline.process(&request.to_job()).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Video processed successfully",
        "data": {
            "url": request.url,
            "language": request.language,
            "subtitle_position": request.subtitle_position,
            "transcription": output.transcription,
            "video_path": output.video_path,
        }
    })))
}

/// `GET /api/video/download/{video_id}` streams a retained rendered video
pub async fn download_handler(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Response {
    let Some(path) = state.outputs.get(&video_id) else {
        return not_found();
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(video_id, error = %e, "Retained video unreadable");
            return not_found();
        }
    };

    let filename = format!("{}_with_subtitles.mp4", sanitize_filename(&video_id));
    let body = Body::from_stream(ReaderStream::new(file));

    (
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "動画が見つかりません" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaFetcher;
    use crate::pipeline::{OutputStore, Pipeline};
    use crate::progress::ProgressRegistry;
    use crate::server::create_router;
    use crate::subtitle::ffmpeg::MockSubtitleRenderer;
    use crate::subtitle::SubtitleStyle;
    use crate::transcribe::{MockSpeechTranscriber, Segment};
    use axum::http::Request;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        fetcher: MockMediaFetcher,
        transcriber: MockSpeechTranscriber,
        renderer: MockSubtitleRenderer,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                fetcher: MockMediaFetcher::new(),
                transcriber: MockSpeechTranscriber::new(),
                renderer: MockSubtitleRenderer::new(),
            }
        }

        fn router(self, output_dir: &Path) -> (Router, AppState) {
            let fetcher: Arc<dyn crate::media::MediaFetcher> = Arc::new(self.fetcher);
            let progress = Arc::new(ProgressRegistry::new());
            let outputs =
                Arc::new(OutputStore::new(output_dir.join("outputs")).unwrap());
            let pipeline = Arc::new(Pipeline::new(
                Arc::clone(&fetcher),
                Arc::new(self.transcriber),
                Arc::new(self.renderer),
                Arc::clone(&progress),
                Arc::clone(&outputs),
                SubtitleStyle::default(),
            ));
            let state = AppState {
                pipeline,
                fetcher,
                progress,
                outputs,
            };
            (create_router(state.clone()), state)
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = Harness::new().router(dir.path());

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_returns_probe_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new();
        harness.fetcher.expect_probe().returning(|_| {
            Ok(MediaInfo {
                video_id: "abc123".to_string(),
                title: Some("A title".to_string()),
                duration: Some(12.5),
                thumbnail_url: None,
            })
        });
        let (router, _) = harness.router(dir.path());

        let response = router
            .oneshot(post_json(
                "/api/video/info",
                json!({ "url": "https://www.youtube.com/watch?v=abc123" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["video_id"], "abc123");
        assert_eq!(json["title"], "A title");
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected_with_japanese_message() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = Harness::new().router(dir.path());

        let response = router
            .oneshot(post_json("/api/video/transcribe", json!({ "url": "" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "無効な動画URLです");
    }

    #[tokio::test]
    async fn test_transcribe_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new();
        harness.fetcher.expect_fetch().returning(|_, _, dest, _| {
            let path = dest.join("audio.wav");
            std::fs::write(&path, b"audio").unwrap();
            Ok(path)
        });
        harness
            .transcriber
            .expect_transcribe()
            .returning(|_, _, _, _| {
                Ok(TranscriptionResult {
                    text: "hello".to_string(),
                    segments: vec![Segment {
                        start: 0.0,
                        end: 1.0,
                        text: "hello".to_string(),
                    }],
                    detected_language: "en".to_string(),
                    target_language: None,
                })
            });
        let (router, _) = harness.router(dir.path());

        let response = router
            .oneshot(post_json(
                "/api/video/transcribe",
                json!({ "url": "https://www.youtube.com/watch?v=abc123", "model": "tiny" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["text"], "hello");
        assert_eq!(json["detected_language"], "en");
        assert!(json.get("target_language").is_none());
    }

    #[tokio::test]
    async fn test_download_missing_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = Harness::new().router(dir.path());

        let response = router
            .oneshot(
                Request::get("/api/video/download/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "動画が見つかりません");
    }

    #[tokio::test]
    async fn test_download_streams_retained_video() {
        let dir = tempfile::tempdir().unwrap();
        let (router, state) = Harness::new().router(dir.path());

        let src = dir.path().join("rendered.mp4");
        fs_err::write(&src, b"rendered bytes").unwrap();
        state.outputs.put("abc123", &src).unwrap();

        let response = router
            .oneshot(
                Request::get("/api/video/download/abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "video/mp4"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"abc123_with_subtitles.mp4\""
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"rendered bytes");
    }
}
