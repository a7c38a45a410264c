//! Task lifecycle events published to NATS.
//!
//! Events are observability facts, not commands: the Postgres queue stays
//! the durable channel, and a failed publish never affects the job outcome.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::task::TaskError;

/// Facts about the task lifecycle, published as `tasks.<kind>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was accepted and enqueued.
    Submitted { task_id: Uuid, kind: String },

    /// A worker claimed the task and began execution.
    Started {
        task_id: Uuid,
        kind: String,
        worker_id: String,
        attempt: i32,
    },

    /// The task reached SUCCESS.
    Succeeded {
        task_id: Uuid,
        kind: String,
        duration_ms: u64,
    },

    /// The task reached FAILURE.
    Failed {
        task_id: Uuid,
        kind: String,
        error: TaskError,
        attempt: i32,
    },
}

impl TaskEvent {
    pub fn kind(&self) -> &str {
        match self {
            TaskEvent::Submitted { kind, .. }
            | TaskEvent::Started { kind, .. }
            | TaskEvent::Succeeded { kind, .. }
            | TaskEvent::Failed { kind, .. } => kind,
        }
    }

    pub fn subject(&self) -> String {
        format!("tasks.{}", self.kind())
    }
}

/// Trait for event publish operations.
///
/// This allows swapping between a real NATS connection and a test capture.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// Real NATS-backed publisher.
pub struct NatsEventPublisher {
    client: async_nats::Client,
}

impl NatsEventPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client.publish(subject, payload).await?;
        Ok(())
    }
}

/// Serialize and publish an event, best-effort. Failures are logged and
/// swallowed so the event stream can never change a job's fate.
pub async fn emit(publisher: &dyn EventPublisher, event: &TaskEvent) {
    match serde_json::to_vec(event) {
        Ok(payload) => {
            if let Err(e) = publisher.publish(event.subject(), payload.into()).await {
                warn!(subject = %event.subject(), error = %e, "failed to publish task event");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize task event"),
    }
}

/// A captured event message.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub subject: String,
    pub payload: Bytes,
}

/// Capturing publisher for tests: records what would have hit NATS.
#[derive(Default)]
pub struct TestEvents {
    published: RwLock<Vec<PublishedEvent>>,
}

impl TestEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn was_published_to(&self, subject: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m.subject == subject)
    }

    /// Decode every captured message on a subject, in publish order.
    pub fn events_for(&self, subject: &str) -> Vec<TaskEvent> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for TestEvents {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedEvent { subject, payload });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_target_their_kind_subject() {
        let event = TaskEvent::Submitted {
            task_id: Uuid::now_v7(),
            kind: "analyze".to_string(),
        };
        assert_eq!(event.subject(), "tasks.analyze");
    }

    #[test]
    fn event_started_serializes() {
        let event = TaskEvent::Started {
            task_id: Uuid::now_v7(),
            kind: "denoise".to_string(),
            worker_id: "worker-1".to_string(),
            attempt: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("started"));
        assert!(json.contains("worker-1"));
    }

    #[test]
    fn event_failed_serializes_the_error() {
        let event = TaskEvent::Failed {
            task_id: Uuid::now_v7(),
            kind: "mix".to_string(),
            error: TaskError::handler("out of disk"),
            attempt: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("out of disk"));
        assert!(json.contains("handler"));
    }

    #[test]
    fn events_roundtrip() {
        let events = vec![
            TaskEvent::Submitted {
                task_id: Uuid::now_v7(),
                kind: "align".to_string(),
            },
            TaskEvent::Succeeded {
                task_id: Uuid::now_v7(),
                kind: "align".to_string(),
                duration_ms: 1500,
            },
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let _: TaskEvent = serde_json::from_str(&json).unwrap();
        }
    }

    #[tokio::test]
    async fn test_events_capture_publishes() {
        let events = TestEvents::new();
        emit(
            &events,
            &TaskEvent::Submitted {
                task_id: Uuid::now_v7(),
                kind: "analyze".to_string(),
            },
        )
        .await;

        assert_eq!(events.publish_count(), 1);
        assert!(events.was_published_to("tasks.analyze"));
        assert_eq!(events.events_for("tasks.analyze").len(), 1);
    }
}
