//! Result store contract: durable task records with CAS state transitions.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::task::{TaskError, TaskRecord, TaskState};

/// Data written alongside a state transition.
#[derive(Debug, Clone)]
pub enum TransitionPayload {
    /// No outcome data (claiming: PENDING -> STARTED).
    None,
    /// Handler output (STARTED -> SUCCESS).
    Output(serde_json::Value),
    /// Structured failure (-> FAILURE).
    Error(TaskError),
}

/// Result of a compare-and-swap transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record was in `from` and is now in `to`.
    Applied,
    /// The record was not in `from`; nothing changed.
    Conflict { actual: TaskState },
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// Durable key-value store of task records.
///
/// The store exclusively owns record mutation. `transition` is a
/// compare-and-swap: it succeeds only if the record is currently in
/// `from`, which totally orders transitions per record and lets
/// concurrent duplicate deliveries race with exactly one winner.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a fresh record. Errors if the id already exists.
    async fn create(&self, record: &TaskRecord) -> Result<()>;

    /// Read the current record snapshot.
    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>>;

    /// Atomically move the record from `from` to `to`, writing the payload
    /// and stamping `started_at`/`finished_at` as the target state requires.
    /// Errors only on infrastructure failure or a missing record; an
    /// out-of-date `from` is a normal `Conflict` outcome.
    async fn transition(
        &self,
        id: Uuid,
        from: TaskState,
        to: TaskState,
        payload: TransitionPayload,
    ) -> Result<TransitionOutcome>;
}
