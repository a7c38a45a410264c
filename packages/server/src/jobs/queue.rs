//! Broker queue contract: the durable channel carrying invocation messages
//! from the gateway to the worker pool.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::task::InvocationMessage;

/// A claimed invocation message, leased to one worker until acked.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Identity of the queue entry (not the task); used to ack.
    pub delivery_id: Uuid,
    pub message: InvocationMessage,
    /// How many times this message has been claimed, this delivery included.
    pub attempt: i32,
}

/// At-least-once invocation channel.
///
/// `claim` leases messages to a worker for a bounded time; a message whose
/// lease lapses without an `ack` becomes claimable again, so a worker crash
/// between claim and ack redelivers rather than drops. Ordering is FIFO in
/// enqueue order per producer; nothing is guaranteed across producers.
#[async_trait]
pub trait BrokerQueue: Send + Sync {
    /// Enqueue an invocation message.
    async fn publish(&self, msg: &InvocationMessage) -> Result<()>;

    /// Claim up to `limit` deliverable messages for `worker_id`,
    /// stamping each with a fresh lease.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Delivery>>;

    /// Acknowledge a delivery, removing the message for good.
    async fn ack(&self, delivery_id: Uuid) -> Result<()>;
}
