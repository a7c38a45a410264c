//! In-memory backend for tests: the same CAS and lease semantics as the
//! Postgres backend, without a database.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::gateway::SubmitBackend;
use super::queue::{BrokerQueue, Delivery};
use super::store::{ResultStore, TransitionOutcome, TransitionPayload};
use super::task::{InvocationMessage, TaskRecord, TaskState};

struct QueueEntry {
    id: Uuid,
    message: InvocationMessage,
    attempt: i32,
    lease_expires_at: Option<DateTime<Utc>>,
    claimed_by: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<Uuid, TaskRecord>,
    queue: Vec<QueueEntry>,
}

/// In-memory result store + broker queue behind one lock, so
/// `create_and_publish` is atomic the same way the Postgres transaction is.
pub struct MemoryJobBackend {
    state: RwLock<MemoryState>,
    lease_ms: i64,
}

impl Default for MemoryJobBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            lease_ms: 60_000,
        }
    }

    pub fn with_lease_ms(lease_ms: i64) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            lease_ms,
        }
    }

    /// Number of task records ever created.
    pub fn record_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .len()
    }

    /// Number of messages still in the queue (claimed or not).
    pub fn queue_len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .queue
            .len()
    }

    /// Force every outstanding lease to lapse, making claimed-but-unacked
    /// messages deliverable again. Simulates a worker crash after claim.
    pub fn expire_leases(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let past = Utc::now() - Duration::seconds(1);
        for entry in &mut state.queue {
            if entry.lease_expires_at.is_some() {
                entry.lease_expires_at = Some(past);
            }
        }
    }
}

fn apply_payload(record: &mut TaskRecord, to: TaskState, payload: TransitionPayload) {
    record.state = to;
    match payload {
        TransitionPayload::None => {}
        TransitionPayload::Output(value) => record.result = Some(value),
        TransitionPayload::Error(error) => {
            record.error_kind = Some(error.kind);
            record.error_message = Some(error.message);
        }
    }
    let now = Utc::now();
    if to == TaskState::Started {
        record.started_at = Some(now);
    }
    if to.is_terminal() {
        record.finished_at = Some(now);
    }
}

#[async_trait]
impl ResultStore for MemoryJobBackend {
    async fn create(&self, record: &TaskRecord) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.records.contains_key(&record.id) {
            bail!("task {} already exists", record.id);
        }
        state.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.records.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TaskState,
        to: TaskState,
        payload: TransitionPayload,
    ) -> Result<TransitionOutcome> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = state.records.get_mut(&id) else {
            bail!("task {id} does not exist");
        };

        if record.state != from {
            return Ok(TransitionOutcome::Conflict {
                actual: record.state,
            });
        }

        apply_payload(record, to, payload);
        Ok(TransitionOutcome::Applied)
    }
}

#[async_trait]
impl BrokerQueue for MemoryJobBackend {
    async fn publish(&self, msg: &InvocationMessage) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.queue.push(QueueEntry {
            id: Uuid::now_v7(),
            message: msg.clone(),
            attempt: 0,
            lease_expires_at: None,
            claimed_by: None,
        });
        Ok(())
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Delivery>> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let lease = now + Duration::milliseconds(self.lease_ms);

        let mut claimed = Vec::new();
        for entry in &mut state.queue {
            if claimed.len() as i64 >= limit {
                break;
            }
            let deliverable = match entry.lease_expires_at {
                None => true,
                Some(expires) => expires < now,
            };
            if !deliverable {
                continue;
            }
            entry.lease_expires_at = Some(lease);
            entry.claimed_by = Some(worker_id.to_string());
            entry.attempt += 1;
            claimed.push(Delivery {
                delivery_id: entry.id,
                message: entry.message.clone(),
                attempt: entry.attempt,
            });
        }

        Ok(claimed)
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.queue.retain(|entry| entry.id != delivery_id);
        Ok(())
    }
}

#[async_trait]
impl SubmitBackend for MemoryJobBackend {
    async fn create_and_publish(&self, record: &TaskRecord, msg: &InvocationMessage) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.records.contains_key(&record.id) {
            bail!("task {} already exists", record.id);
        }
        state.records.insert(record.id, record.clone());
        state.queue.push(QueueEntry {
            id: Uuid::now_v7(),
            message: msg.clone(),
            attempt: 0,
            lease_expires_at: None,
            claimed_by: None,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::task::TaskError;
    use serde_json::json;

    fn sample_record() -> TaskRecord {
        TaskRecord::pending("analyze", json!({"file_path": "a.wav"}))
    }

    fn sample_message(task_id: Uuid) -> InvocationMessage {
        InvocationMessage {
            task_id,
            kind: "analyze".to_string(),
            args: json!({"file_path": "a.wav"}),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let backend = MemoryJobBackend::new();
        let record = sample_record();

        backend.create(&record).await.unwrap();
        assert!(backend.create(&record).await.is_err());
    }

    #[tokio::test]
    async fn transition_applies_only_from_the_expected_state() {
        let backend = MemoryJobBackend::new();
        let record = sample_record();
        backend.create(&record).await.unwrap();

        let outcome = backend
            .transition(
                record.id,
                TaskState::Pending,
                TaskState::Started,
                TransitionPayload::None,
            )
            .await
            .unwrap();
        assert!(outcome.applied());

        // Second claim conflicts and reports the actual state.
        let outcome = backend
            .transition(
                record.id,
                TaskState::Pending,
                TaskState::Started,
                TransitionPayload::None,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Conflict {
                actual: TaskState::Started
            }
        );
    }

    #[tokio::test]
    async fn terminal_records_never_change() {
        let backend = MemoryJobBackend::new();
        let record = sample_record();
        backend.create(&record).await.unwrap();

        backend
            .transition(
                record.id,
                TaskState::Pending,
                TaskState::Started,
                TransitionPayload::None,
            )
            .await
            .unwrap();
        backend
            .transition(
                record.id,
                TaskState::Started,
                TaskState::Success,
                TransitionPayload::Output(json!({"bpm": 140.0})),
            )
            .await
            .unwrap();

        let outcome = backend
            .transition(
                record.id,
                TaskState::Started,
                TaskState::Failure,
                TransitionPayload::Error(TaskError::handler("late")),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Conflict {
                actual: TaskState::Success
            }
        );

        let stored = backend.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Success);
        assert_eq!(stored.result, Some(json!({"bpm": 140.0})));
        assert!(stored.error().is_none());
    }

    #[tokio::test]
    async fn transition_timestamps_are_stamped_once() {
        let backend = MemoryJobBackend::new();
        let record = sample_record();
        backend.create(&record).await.unwrap();

        backend
            .transition(
                record.id,
                TaskState::Pending,
                TaskState::Started,
                TransitionPayload::None,
            )
            .await
            .unwrap();
        let started_at = backend
            .get(record.id)
            .await
            .unwrap()
            .unwrap()
            .started_at
            .unwrap();

        backend
            .transition(
                record.id,
                TaskState::Started,
                TaskState::Success,
                TransitionPayload::Output(json!({})),
            )
            .await
            .unwrap();
        let stored = backend.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.started_at, Some(started_at));
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn claimed_messages_are_invisible_until_the_lease_lapses() {
        let backend = MemoryJobBackend::new();
        let task_id = Uuid::now_v7();
        backend.publish(&sample_message(task_id)).await.unwrap();

        let first = backend.claim("w1", 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].attempt, 1);

        // Leased to w1: nothing for w2.
        assert!(backend.claim("w2", 10).await.unwrap().is_empty());

        backend.expire_leases();
        let redelivered = backend.claim("w2", 10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].attempt, 2);
        assert_eq!(redelivered[0].message.task_id, task_id);
    }

    #[tokio::test]
    async fn acked_messages_are_gone() {
        let backend = MemoryJobBackend::new();
        backend
            .publish(&sample_message(Uuid::now_v7()))
            .await
            .unwrap();

        let claimed = backend.claim("w1", 10).await.unwrap();
        backend.ack(claimed[0].delivery_id).await.unwrap();

        assert_eq!(backend.queue_len(), 0);
        backend.expire_leases();
        assert!(backend.claim("w1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_respects_enqueue_order_and_limit() {
        let backend = MemoryJobBackend::new();
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();
        backend.publish(&sample_message(first)).await.unwrap();
        backend.publish(&sample_message(second)).await.unwrap();

        let claimed = backend.claim("w1", 1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].message.task_id, first);

        let claimed = backend.claim("w1", 1).await.unwrap();
        assert_eq!(claimed[0].message.task_id, second);
    }
}
