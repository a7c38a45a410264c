//! Job gateway: the submission and status-query operations behind the
//! network surface.
//!
//! Submission validates synchronously, persists a PENDING record together
//! with its invocation message in one atomic step, and returns the new id
//! without waiting on execution. Status is a pure read of the record.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::events::{emit, EventPublisher, TaskEvent};
use super::registry::{SharedTaskRegistry, ValidationError};
use super::store::ResultStore;
use super::task::{InvocationMessage, TaskRecord};

/// Persistence surface for the submission path.
///
/// Creating the record and enqueueing its invocation must be one atomic
/// step: a client must never observe an enqueued message without a record
/// or a record that was silently never enqueued.
#[async_trait]
pub trait SubmitBackend: Send + Sync {
    async fn create_and_publish(&self, record: &TaskRecord, msg: &InvocationMessage) -> Result<()>;
}

/// Errors surfaced synchronously to the submitter. Anything that happens
/// after submission is recorded on the task and observed via polling.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("unknown task kind: {0}")]
    UnknownKind(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct Gateway {
    registry: SharedTaskRegistry,
    backend: Arc<dyn SubmitBackend>,
    store: Arc<dyn ResultStore>,
    events: Arc<dyn EventPublisher>,
}

impl Gateway {
    pub fn new(
        registry: SharedTaskRegistry,
        backend: Arc<dyn SubmitBackend>,
        store: Arc<dyn ResultStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            registry,
            backend,
            store,
            events,
        }
    }

    /// Validate and enqueue a submission, returning the new task id.
    ///
    /// Rejections (unknown kind, schema violation) happen before any state
    /// is created, so a failed submit leaves no trace.
    pub async fn submit(
        &self,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, SubmitError> {
        let descriptor = self
            .registry
            .lookup(kind)
            .ok_or_else(|| SubmitError::UnknownKind(kind.to_string()))?;

        let args = descriptor.validate(&payload)?;

        let record = TaskRecord::pending(kind, args.clone());
        let msg = InvocationMessage {
            task_id: record.id,
            kind: kind.to_string(),
            args,
        };

        self.backend
            .create_and_publish(&record, &msg)
            .await
            .map_err(SubmitError::Internal)?;

        emit(
            self.events.as_ref(),
            &TaskEvent::Submitted {
                task_id: record.id,
                kind: kind.to_string(),
            },
        )
        .await;

        info!(task_id = %record.id, kind, "task submitted");

        Ok(record.id)
    }

    /// Current record snapshot, or `None` for an id never submitted.
    pub async fn status(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        self.store.get(id).await
    }
}
