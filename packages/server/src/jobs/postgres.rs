//! PostgreSQL backend for the result store and the broker queue.
//!
//! One pool serves both concerns: the `tasks` table is the record store,
//! `task_queue` the invocation channel. Claiming uses `FOR UPDATE SKIP
//! LOCKED` so concurrent workers never double-claim a live lease, and an
//! expired lease makes the row claimable again (visibility-timeout
//! redelivery).

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::gateway::SubmitBackend;
use super::queue::{BrokerQueue, Delivery};
use super::store::{ResultStore, TransitionOutcome, TransitionPayload};
use super::task::{InvocationMessage, TaskRecord, TaskState};

const DEFAULT_LEASE_MS: i64 = 60_000;

pub struct PostgresJobBackend {
    pool: PgPool,
    lease_ms: i64,
}

impl PostgresJobBackend {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_ms: DEFAULT_LEASE_MS,
        }
    }

    /// Create with a custom lease duration (visibility timeout).
    pub fn with_lease_ms(pool: PgPool, lease_ms: i64) -> Self {
        Self { pool, lease_ms }
    }
}

#[derive(FromRow)]
struct QueueRow {
    id: Uuid,
    task_id: Uuid,
    kind: String,
    args: serde_json::Value,
    attempt: i32,
}

impl From<QueueRow> for Delivery {
    fn from(row: QueueRow) -> Self {
        Delivery {
            delivery_id: row.id,
            message: InvocationMessage {
                task_id: row.task_id,
                kind: row.kind,
                args: row.args,
            },
            attempt: row.attempt,
        }
    }
}

#[async_trait]
impl ResultStore for PostgresJobBackend {
    async fn create(&self, record: &TaskRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, kind, args, state, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(&record.kind)
        .bind(&record.args)
        .bind(record.state)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        let record = sqlx::query_as::<_, TaskRecord>(
            r#"
            SELECT id, kind, args, state, result, error_kind, error_message,
                   created_at, started_at, finished_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TaskState,
        to: TaskState,
        payload: TransitionPayload,
    ) -> Result<TransitionOutcome> {
        let (result, error_kind, error_message) = match payload {
            TransitionPayload::None => (None, None, None),
            TransitionPayload::Output(value) => (Some(value), None, None),
            TransitionPayload::Error(error) => (None, Some(error.kind), Some(error.message)),
        };

        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET state = $3,
                result = $4,
                error_kind = $5,
                error_message = $6,
                started_at = CASE WHEN $7 THEN NOW() ELSE started_at END,
                finished_at = CASE WHEN $8 THEN NOW() ELSE finished_at END
            WHERE id = $1 AND state = $2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(result)
        .bind(error_kind)
        .bind(error_message)
        .bind(to == TaskState::Started)
        .bind(to.is_terminal())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(TransitionOutcome::Applied);
        }

        let actual = sqlx::query_scalar::<_, TaskState>("SELECT state FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => Ok(TransitionOutcome::Conflict { actual }),
            None => bail!("task {id} does not exist"),
        }
    }
}

#[async_trait]
impl BrokerQueue for PostgresJobBackend {
    async fn publish(&self, msg: &InvocationMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_queue (id, task_id, kind, args)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(msg.task_id)
        .bind(&msg.kind)
        .bind(&msg.args)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            WITH next_messages AS (
                SELECT id
                FROM task_queue
                WHERE lease_expires_at IS NULL OR lease_expires_at < NOW()
                ORDER BY enqueued_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE task_queue
            SET claimed_by = $2,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                attempt = attempt + 1
            WHERE id IN (SELECT id FROM next_messages)
            RETURNING id, task_id, kind, args, attempt
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .bind(self.lease_ms.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Delivery::from).collect())
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM task_queue WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl SubmitBackend for PostgresJobBackend {
    async fn create_and_publish(&self, record: &TaskRecord, msg: &InvocationMessage) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, kind, args, state, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(&record.kind)
        .bind(&record.args)
        .bind(record.state)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO task_queue (id, task_id, kind, args)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(msg.task_id)
        .bind(&msg.kind)
        .bind(&msg.args)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
