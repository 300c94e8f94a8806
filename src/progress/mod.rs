use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Pipeline stage, as exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Downloading,
    Transcribing,
    Rendering,
    Complete,
    Failed,
}

/// Event pushed over a job's progress channel
///
/// Serializes as `{"stage": ..., "progress": ...}` or `{"error": ...}`,
/// matching the WebSocket wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobEvent {
    Status { stage: Stage, progress: f32 },
    Error { error: String },
}

/// Registry of per-job progress channels
///
/// At most one channel per job id: a second attach replaces the first
/// (last-writer-wins), ending the replaced receiver's stream. Publishing is
/// best-effort with no buffering or replay.
#[derive(Default)]
pub struct ProgressRegistry {
    channels: Mutex<HashMap<String, UnboundedSender<JobEvent>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a channel for `job_id`, replacing any existing one
    pub fn attach(&self, job_id: &str) -> UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channels = self.channels.lock().expect("progress registry poisoned");
        if channels.insert(job_id.to_string(), tx).is_some() {
            tracing::debug!(job_id, "Replaced existing progress channel");
        }
        rx
    }

    /// Best-effort send to the channel attached for `job_id`
    ///
    /// Events for jobs with no attached channel are silently dropped. A
    /// failed send means the client is gone: the failure is logged and the
    /// channel removed.
    pub fn publish(&self, job_id: &str, event: JobEvent) {
        let mut channels = self.channels.lock().expect("progress registry poisoned");
        if let Some(tx) = channels.get(job_id) {
            if tx.send(event).is_err() {
                tracing::warn!(job_id, "Progress channel closed, removing");
                channels.remove(job_id);
            }
        }
    }

    /// Number of attached channels
    pub fn len(&self) -> usize {
        self.channels.lock().expect("progress registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(stage: Stage, progress: f32) -> JobEvent {
        JobEvent::Status { stage, progress }
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(status(Stage::Downloading, 25.0)).unwrap();
        assert_eq!(json["stage"], "downloading");
        assert_eq!(json["progress"], 25.0);

        let json = serde_json::to_value(JobEvent::Error {
            error: "無効な動画URLです".to_string(),
        })
        .unwrap();
        assert_eq!(json["error"], "無効な動画URLです");
        assert!(json.get("stage").is_none());
    }

    #[tokio::test]
    async fn test_publish_without_channel_is_dropped() {
        let registry = ProgressRegistry::new();
        // Must not panic or accumulate anything
        registry.publish("nobody", status(Stage::Complete, 100.0));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_attached_channel_receives_events() {
        let registry = ProgressRegistry::new();
        let mut rx = registry.attach("job-1");

        registry.publish("job-1", status(Stage::Downloading, 10.0));
        registry.publish("job-1", status(Stage::Downloading, 20.0));

        assert_eq!(rx.recv().await.unwrap(), status(Stage::Downloading, 10.0));
        assert_eq!(rx.recv().await.unwrap(), status(Stage::Downloading, 20.0));
    }

    #[tokio::test]
    async fn test_second_attach_replaces_first() {
        let registry = ProgressRegistry::new();
        let mut first = registry.attach("job-1");
        let mut second = registry.attach("job-1");

        registry.publish("job-1", status(Stage::Transcribing, 50.0));

        // The replaced receiver's stream ends; only the latest gets events
        assert!(first.recv().await.is_none());
        assert_eq!(
            second.recv().await.unwrap(),
            status(Stage::Transcribing, 50.0)
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_removes_channel() {
        let registry = ProgressRegistry::new();
        let rx = registry.attach("job-1");
        drop(rx);

        registry.publish("job-1", status(Stage::Complete, 100.0));
        assert!(registry.is_empty());
    }
}
