//! Task record model: the central entity tracked by the result store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a task.
///
/// Transitions are monotonic: `Pending -> Started -> {Success, Failure}`.
/// The store's compare-and-swap `transition` is the only way to move
/// between states, so no other edge is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "task_state", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Pending,
    Started,
    Success,
    Failure,
}

impl TaskState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

/// Category of a recorded task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_error_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The kind had no registered handler at dispatch time. Permanent.
    UnknownKind,
    /// The handler itself returned an error.
    Handler,
}

/// Structured failure description stored on a FAILURE record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn unknown_kind(kind: &str) -> Self {
        Self {
            kind: TaskErrorKind::UnknownKind,
            message: format!("no handler registered for task kind '{kind}'"),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::Handler,
            message: message.into(),
        }
    }
}

/// One submitted unit of work and its outcome.
///
/// `args` holds the normalized payload: validated against the kind's schema
/// and re-serialized with defaults applied, so workers and clients see the
/// same resolved values. `result` is present iff state is SUCCESS, the error
/// columns iff state is FAILURE; each timestamp is written exactly once.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: String,
    pub args: serde_json::Value,
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<TaskErrorKind>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a fresh PENDING record for a validated submission.
    pub fn pending(kind: &str, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: kind.to_string(),
            args,
            state: TaskState::Pending,
            result: None,
            error_kind: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// The structured error, if the record has failed.
    pub fn error(&self) -> Option<TaskError> {
        self.error_kind.map(|kind| TaskError {
            kind,
            message: self.error_message.clone().unwrap_or_default(),
        })
    }
}

/// The payload carried through the broker queue from gateway to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationMessage {
    pub task_id: Uuid,
    pub kind: String,
    pub args: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> TaskRecord {
        TaskRecord::pending("analyze", json!({"file_path": "a.wav"}))
    }

    #[test]
    fn new_record_starts_pending() {
        let record = sample_record();
        assert_eq!(record.state, TaskState::Pending);
        assert!(record.result.is_none());
        assert!(record.error().is_none());
        assert!(record.started_at.is_none());
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn record_ids_are_unique() {
        assert_ne!(sample_record().id, sample_record().id);
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Started.is_terminal());
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Failure.is_terminal());
    }

    #[test]
    fn state_serializes_to_wire_format() {
        assert_eq!(
            serde_json::to_value(TaskState::Pending).unwrap(),
            json!("PENDING")
        );
        assert_eq!(
            serde_json::to_value(TaskState::Failure).unwrap(),
            json!("FAILURE")
        );
    }

    #[test]
    fn unknown_kind_error_names_the_kind() {
        let error = TaskError::unknown_kind("frobnicate");
        assert_eq!(error.kind, TaskErrorKind::UnknownKind);
        assert!(error.message.contains("frobnicate"));
    }

    #[test]
    fn invocation_message_roundtrips() {
        let msg = InvocationMessage {
            task_id: Uuid::now_v7(),
            kind: "mix".to_string(),
            args: json!({"beat_path": "b.wav", "vocal_path": "v.wav"}),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: InvocationMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, msg.task_id);
        assert_eq!(back.kind, "mix");
    }
}
