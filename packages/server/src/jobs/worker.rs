//! Task worker: claims invocation messages and drives records through the
//! state machine.
//!
//! Each worker runs an independent loop:
//!
//! ```text
//! TaskWorker
//!     │
//!     ├─► claim messages from the broker queue (leased)
//!     ├─► look up the handler in the registry
//!     ├─► CAS the record PENDING -> STARTED
//!     ├─► execute the handler
//!     ├─► CAS STARTED -> SUCCESS / FAILURE
//!     └─► ack the message
//! ```
//!
//! Acking happens last: a crash anywhere before it leaves the message to be
//! redelivered once its lease lapses. On redelivery the claim CAS conflicts,
//! and the descriptor's idempotency flag decides between safe re-execution
//! and skipping; the terminal CAS still admits exactly one winner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{emit, EventPublisher, TaskEvent};
use super::queue::{BrokerQueue, Delivery};
use super::registry::{SharedTaskRegistry, TaskContext};
use super::store::{ResultStore, TransitionOutcome, TransitionPayload};
use super::task::{TaskError, TaskState};

/// Configuration for a single worker loop.
#[derive(Debug, Clone)]
pub struct TaskWorkerConfig {
    /// Maximum number of messages to claim at once.
    pub batch_size: i64,
    /// How long to wait when no messages are available.
    pub poll_interval: Duration,
    /// Worker ID for this instance.
    pub worker_id: String,
}

impl Default for TaskWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            poll_interval: Duration::from_secs(1),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl TaskWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// One member of the worker pool. Executes one task at a time; parallelism
/// comes from running several workers.
pub struct TaskWorker {
    queue: Arc<dyn BrokerQueue>,
    store: Arc<dyn ResultStore>,
    registry: SharedTaskRegistry,
    ctx: Arc<TaskContext>,
    events: Arc<dyn EventPublisher>,
    config: TaskWorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl TaskWorker {
    pub fn new(
        queue: Arc<dyn BrokerQueue>,
        store: Arc<dyn ResultStore>,
        registry: SharedTaskRegistry,
        ctx: Arc<TaskContext>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_config(queue, store, registry, ctx, events, TaskWorkerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn BrokerQueue>,
        store: Arc<dyn ResultStore>,
        registry: SharedTaskRegistry,
        ctx: Arc<TaskContext>,
        events: Arc<dyn EventPublisher>,
        config: TaskWorkerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            registry,
            ctx,
            events,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a shutdown handle for graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request shutdown of the worker.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Claim and process one batch. Returns the number of messages handled.
    pub async fn run_once(&self) -> Result<usize> {
        let deliveries = self
            .queue
            .claim(&self.config.worker_id, self.config.batch_size)
            .await?;

        let count = deliveries.len();
        for delivery in deliveries {
            if self.is_shutdown_requested() {
                break;
            }
            self.process_delivery(delivery).await;
        }

        Ok(count)
    }

    /// Run the worker until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "task worker starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "failed to claim messages");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "task worker stopped");
        Ok(())
    }

    /// Run until a shutdown signal is received.
    ///
    /// Convenience method that listens for Ctrl+C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }

    async fn process_delivery(&self, delivery: Delivery) {
        let Delivery {
            delivery_id,
            message,
            attempt,
        } = delivery;
        let task_id = message.task_id;
        let kind = message.kind.clone();

        // Unregistered kinds can appear here despite submit-time checks when
        // gateway and worker registries diverge across a deploy. Permanent
        // failure: record it and ack without requeueing.
        let Some(descriptor) = self.registry.lookup(&kind) else {
            warn!(task_id = %task_id, kind = %kind, "no handler for claimed task");
            let error = TaskError::unknown_kind(&kind);
            if !self.fail_from_any_live_state(task_id, &kind, error, attempt).await {
                return;
            }
            self.ack(delivery_id, task_id).await;
            return;
        };

        // Claim the record.
        match self
            .store
            .transition(task_id, TaskState::Pending, TaskState::Started, TransitionPayload::None)
            .await
        {
            Ok(TransitionOutcome::Applied) => {
                emit(
                    self.events.as_ref(),
                    &TaskEvent::Started {
                        task_id,
                        kind: kind.clone(),
                        worker_id: self.config.worker_id.clone(),
                        attempt,
                    },
                )
                .await;
            }
            Ok(TransitionOutcome::Conflict { actual }) if actual.is_terminal() => {
                // Duplicate delivery of a finished task.
                debug!(task_id = %task_id, state = ?actual, "task already terminal, dropping delivery");
                self.ack(delivery_id, task_id).await;
                return;
            }
            Ok(TransitionOutcome::Conflict { .. }) => {
                // Already STARTED: a redelivery. Without a live/crashed
                // distinction, re-execution is the safe default for
                // idempotent handlers; everything else waits for an operator.
                if !descriptor.idempotent() {
                    warn!(
                        task_id = %task_id,
                        kind = %kind,
                        "redelivered non-idempotent task already started, skipping re-execution"
                    );
                    self.ack(delivery_id, task_id).await;
                    return;
                }
                debug!(task_id = %task_id, kind = %kind, "re-executing redelivered task");
            }
            Err(e) => {
                // Store unreachable. Leave the message unacked so the lease
                // lapses and the attempt repeats.
                error!(task_id = %task_id, error = %e, "failed to claim task record");
                return;
            }
        }

        // Execute.
        debug!(task_id = %task_id, kind = %kind, "executing task");
        let started = Instant::now();
        let outcome = descriptor.run(message.args.clone(), self.ctx.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let finished = match outcome {
            Ok(result) => {
                match self
                    .store
                    .transition(
                        task_id,
                        TaskState::Started,
                        TaskState::Success,
                        TransitionPayload::Output(result),
                    )
                    .await
                {
                    Ok(TransitionOutcome::Applied) => {
                        info!(task_id = %task_id, kind = %kind, duration_ms, "task succeeded");
                        emit(
                            self.events.as_ref(),
                            &TaskEvent::Succeeded {
                                task_id,
                                kind: kind.clone(),
                                duration_ms,
                            },
                        )
                        .await;
                        true
                    }
                    Ok(TransitionOutcome::Conflict { actual }) => {
                        // A concurrent attempt finished first; its write stands.
                        debug!(task_id = %task_id, state = ?actual, "terminal write lost the race");
                        true
                    }
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "failed to record task success");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %task_id, kind = %kind, error = %e, "task failed");
                let error = TaskError::handler(e.to_string());
                match self
                    .store
                    .transition(
                        task_id,
                        TaskState::Started,
                        TaskState::Failure,
                        TransitionPayload::Error(error.clone()),
                    )
                    .await
                {
                    Ok(TransitionOutcome::Applied) => {
                        emit(
                            self.events.as_ref(),
                            &TaskEvent::Failed {
                                task_id,
                                kind: kind.clone(),
                                error,
                                attempt,
                            },
                        )
                        .await;
                        true
                    }
                    Ok(TransitionOutcome::Conflict { actual }) => {
                        debug!(task_id = %task_id, state = ?actual, "terminal write lost the race");
                        true
                    }
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "failed to record task failure");
                        false
                    }
                }
            }
        };

        // Ack only once the outcome is durable; otherwise the lease lapses
        // and the message comes back.
        if finished {
            self.ack(delivery_id, task_id).await;
        }
    }

    /// Drive a task to FAILURE from PENDING or STARTED. Returns false if the
    /// store was unreachable (caller should leave the delivery unacked).
    async fn fail_from_any_live_state(
        &self,
        task_id: Uuid,
        kind: &str,
        error: TaskError,
        attempt: i32,
    ) -> bool {
        let attempt_from = |from| {
            self.store.transition(
                task_id,
                from,
                TaskState::Failure,
                TransitionPayload::Error(error.clone()),
            )
        };

        let outcome = match attempt_from(TaskState::Pending).await {
            Ok(TransitionOutcome::Conflict {
                actual: TaskState::Started,
            }) => attempt_from(TaskState::Started).await,
            other => other,
        };

        match outcome {
            Ok(TransitionOutcome::Applied) => {
                emit(
                    self.events.as_ref(),
                    &TaskEvent::Failed {
                        task_id,
                        kind: kind.to_string(),
                        error,
                        attempt,
                    },
                )
                .await;
                true
            }
            Ok(TransitionOutcome::Conflict { .. }) => true,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "failed to record task failure");
                false
            }
        }
    }

    async fn ack(&self, delivery_id: Uuid, task_id: Uuid) {
        if let Err(e) = self.queue.ack(delivery_id).await {
            error!(task_id = %task_id, error = %e, "failed to ack delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TaskWorkerConfig::default();
        assert_eq!(config.batch_size, 1);
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn config_with_worker_id() {
        let config = TaskWorkerConfig::with_worker_id("my-worker");
        assert_eq!(config.worker_id, "my-worker");
    }
}
