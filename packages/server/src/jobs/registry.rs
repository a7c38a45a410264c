//! Task registry: maps kind strings to validators and handlers.
//!
//! The registry is built once at startup, shared by `Arc`, and never
//! mutated afterwards, so dispatch is a pure lookup. Registering the same
//! kind twice is a configuration error surfaced at startup, not at
//! request time.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A submission payload that failed its kind's schema.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Shared dependencies handed to every handler invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Root directory for handler-produced artifacts.
    pub storage_dir: PathBuf,
}

/// Typed argument payload for one task kind.
///
/// Implementors get schema validation for free through serde; `validate`
/// adds the range and semantic checks serde cannot express. Defaults are
/// applied during deserialization, so re-serializing a parsed payload
/// yields the normalized args stored on the record.
pub trait TaskArgs: DeserializeOwned + Serialize {
    /// The kind string this payload belongs to.
    const KIND: &'static str;

    /// Range and semantic checks beyond shape and types.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Whether the handler can safely run twice for the same task.
    /// Non-idempotent kinds are excluded from automatic redelivery retry.
    fn idempotent() -> bool {
        true
    }
}

type BoxedHandler = Box<
    dyn Fn(
            serde_json::Value,
            Arc<TaskContext>,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

type BoxedValidator =
    Box<dyn Fn(&serde_json::Value) -> Result<serde_json::Value, ValidationError> + Send + Sync>;

/// One registered task kind: its schema validator, handler, and policies.
pub struct HandlerDescriptor {
    kind: &'static str,
    idempotent: bool,
    validate: BoxedValidator,
    handler: BoxedHandler,
}

impl HandlerDescriptor {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn idempotent(&self) -> bool {
        self.idempotent
    }

    /// Validate a raw submission payload, returning the normalized args
    /// (defaults applied) to store and dispatch.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<serde_json::Value, ValidationError> {
        (self.validate)(payload)
    }

    /// Execute the handler with a record's normalized args.
    pub async fn run(
        &self,
        args: serde_json::Value,
        ctx: Arc<TaskContext>,
    ) -> Result<serde_json::Value> {
        (self.handler)(args, ctx).await
    }
}

/// Registry of all task kinds this deployment can execute.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<&'static str, HandlerDescriptor>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a task kind with its handler.
    ///
    /// The payload type drives validation: the raw JSON is parsed into `A`
    /// (rejecting unknown or missing fields, applying defaults), checked
    /// with `A::validate`, and re-serialized as the normalized args.
    pub fn register<A, F, Fut>(&mut self, handler: F) -> Result<()>
    where
        A: TaskArgs + Send + 'static,
        F: Fn(A, Arc<TaskContext>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let kind = A::KIND;
        if self.handlers.contains_key(kind) {
            bail!("task kind '{kind}' is registered twice");
        }

        let validate: BoxedValidator = Box::new(move |payload| {
            let args: A = serde_json::from_value(payload.clone())
                .map_err(|e| ValidationError(format!("invalid {kind} payload: {e}")))?;
            args.validate()?;
            serde_json::to_value(&args).map_err(|e| ValidationError(e.to_string()))
        });

        let boxed: BoxedHandler = Box::new(move |args, ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let args: A = serde_json::from_value(args)
                    .map_err(|e| anyhow!("failed to deserialize {kind} args: {e}"))?;
                handler(args, ctx).await
            })
        });

        self.handlers.insert(
            kind,
            HandlerDescriptor {
                kind,
                idempotent: A::idempotent(),
                validate,
                handler: boxed,
            },
        );

        Ok(())
    }

    pub fn lookup(&self, kind: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(kind)
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// All registered kinds, for startup logging.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Thread-safe registry handle.
pub type SharedTaskRegistry = Arc<TaskRegistry>;
