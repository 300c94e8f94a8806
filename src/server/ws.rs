use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;

use super::AppState;

/// `WS /ws/{video_id}` pushes `{stage, progress}` / `{error}` frames
///
/// The channel is output-only: client messages are read and discarded. A
/// second connection for the same id replaces the first, which then closes.
pub async fn progress_socket_handler(
    ws: WebSocketUpgrade,
    Path(video_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| progress_socket(socket, video_id, state))
}

async fn progress_socket(mut socket: WebSocket, video_id: String, state: AppState) {
    let mut rx = state.progress.attach(&video_id);
    tracing::info!(video_id, "Progress socket attached");

    loop {
        tokio::select! {
            event = rx.recv() => {
                // A closed receiver means a newer socket took over the job
                let Some(event) = event else { break };

                let frame = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(video_id, error = %e, "Failed to encode progress event");
                        continue;
                    }
                };

                if socket.send(Message::Text(frame.into())).await.is_err() {
                    tracing::debug!(video_id, "Client went away mid-send");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Inbound frames are ignored
                    }
                    Some(Err(e)) => {
                        tracing::debug!(video_id, error = %e, "Progress socket errored");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(video_id, "Progress socket closed");
}
