//! Health endpoint reporting the dispatch components: result store,
//! broker queue, and the lifecycle event stream.

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use std::time::Duration;

use crate::server::app::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    result_store: StoreHealth,
    broker_queue: QueueHealth,
    event_stream: EventStreamHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    pool_connections: u32,
    pool_idle: usize,
}

#[derive(Serialize)]
pub struct QueueHealth {
    reachable: bool,
    /// Undelivered or in-flight invocation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct EventStreamHealth {
    connected: bool,
    state: String,
}

/// `GET /health` - probe the task-record store, the invocation queue, and
/// the NATS event stream.
///
/// Dispatch needs the store and the queue, so either of those failing turns
/// the response 503. The event stream only degrades observability; its
/// connection state is reported but never fails the check.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let result_store = probe_store(&state).await;
    let broker_queue = probe_queue(&state).await;
    let event_stream = probe_event_stream(&state);

    let dispatchable = result_store.reachable && broker_queue.reachable;
    let status = if dispatchable { "healthy" } else { "unhealthy" };
    let code = if dispatchable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            result_store,
            broker_queue,
            event_stream,
        }),
    )
}

async fn probe_store(state: &AppState) -> StoreHealth {
    let error = match tokio::time::timeout(
        PROBE_TIMEOUT,
        sqlx::query("SELECT 1 FROM tasks LIMIT 1").execute(&state.db_pool),
    )
    .await
    {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(format!("query failed: {e}")),
        Err(_) => Some("query timeout (>5s)".to_string()),
    };

    StoreHealth {
        reachable: error.is_none(),
        error,
        pool_connections: state.db_pool.size(),
        pool_idle: state.db_pool.num_idle(),
    }
}

async fn probe_queue(state: &AppState) -> QueueHealth {
    match tokio::time::timeout(
        PROBE_TIMEOUT,
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM task_queue").fetch_one(&state.db_pool),
    )
    .await
    {
        Ok(Ok(depth)) => QueueHealth {
            reachable: true,
            depth: Some(depth),
            error: None,
        },
        Ok(Err(e)) => QueueHealth {
            reachable: false,
            depth: None,
            error: Some(format!("query failed: {e}")),
        },
        Err(_) => QueueHealth {
            reachable: false,
            depth: None,
            error: Some("query timeout (>5s)".to_string()),
        },
    }
}

fn probe_event_stream(state: &AppState) -> EventStreamHealth {
    let connection = state.nats.connection_state();
    let label = match connection {
        async_nats::connection::State::Connected => "connected",
        async_nats::connection::State::Pending => "reconnecting",
        async_nats::connection::State::Disconnected => "disconnected",
    };

    EventStreamHealth {
        connected: connection == async_nats::connection::State::Connected,
        state: label.to_string(),
    }
}
