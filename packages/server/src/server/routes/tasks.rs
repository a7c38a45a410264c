//! Submission and status endpoints.

use axum::extract::{Extension, Path};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::jobs::{TaskError, TaskRecord, TaskState};
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
}

/// `POST /submit/{kind}` - validate and enqueue, returning the task id
/// without waiting on execution.
pub async fn submit_handler(
    Extension(state): Extension<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let task_id = state.gateway.submit(&kind, payload).await?;
    Ok(Json(SubmitResponse { task_id }))
}

/// Full record snapshot. `result` is null in every state but SUCCESS,
/// `error` in every state but FAILURE.
#[derive(Serialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub kind: String,
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<TaskRecord> for TaskSnapshot {
    fn from(record: TaskRecord) -> Self {
        let error = record.error();
        Self {
            id: record.id,
            kind: record.kind,
            state: record.state,
            result: record.result,
            error,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

/// `GET /tasks/{task_id}` - pure read of the current record.
pub async fn status_handler(
    Extension(state): Extension<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, ApiError> {
    let id = Uuid::parse_str(&task_id).map_err(|_| ApiError::NotFound)?;

    let record = state
        .gateway
        .status(id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_serializes_null_result_while_pending() {
        let record = TaskRecord::pending("analyze", json!({"file_path": "a.wav"}));
        let snapshot = TaskSnapshot::from(record);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], json!("PENDING"));
        assert_eq!(value["result"], json!(null));
        assert_eq!(value["error"], json!(null));
    }
}
