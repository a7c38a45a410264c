//! Job lifecycle and execution-coordination core.
//!
//! This module provides the infrastructure that carries a submission to a
//! terminal state:
//! - [`TaskRegistry`] - static kind-to-handler mapping, built at startup
//! - [`Gateway`] - validated submission and status queries
//! - [`BrokerQueue`] / [`PostgresJobBackend`] - durable invocation channel
//! - [`ResultStore`] - CAS-guarded task records
//! - [`TaskWorker`] - claim/execute/record loop
//!
//! # Architecture
//!
//! ```text
//! Gateway.submit(kind, payload)
//!     │
//!     ├─► registry validate (reject before any state exists)
//!     └─► one transaction: PENDING record + queue message
//!
//! TaskWorker
//!     │
//!     ├─► claim leased messages (SKIP LOCKED)
//!     ├─► CAS PENDING -> STARTED
//!     ├─► run registered handler
//!     ├─► CAS STARTED -> SUCCESS / FAILURE
//!     └─► ack
//! ```
//!
//! Handler bodies live in `crate::tasks`; this module only coordinates.

pub mod events;
mod gateway;
mod postgres;
mod queue;
mod registry;
mod store;
mod task;
pub mod testing;
mod worker;

pub use gateway::{Gateway, SubmitBackend, SubmitError};
pub use postgres::PostgresJobBackend;
pub use queue::{BrokerQueue, Delivery};
pub use registry::{
    HandlerDescriptor, SharedTaskRegistry, TaskArgs, TaskContext, TaskRegistry, ValidationError,
};
pub use store::{ResultStore, TransitionOutcome, TransitionPayload};
pub use task::{InvocationMessage, TaskError, TaskErrorKind, TaskRecord, TaskState};
pub use worker::{TaskWorker, TaskWorkerConfig};
