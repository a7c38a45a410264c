//! Shared test harness: gateway + worker wired to the in-memory backend.

use std::path::PathBuf;
use std::sync::Arc;

use tracklab_core::jobs::events::TestEvents;
use tracklab_core::jobs::testing::MemoryJobBackend;
use tracklab_core::jobs::{
    Gateway, SharedTaskRegistry, TaskContext, TaskRegistry, TaskWorker, TaskWorkerConfig,
};
use tracklab_core::tasks::build_registry;

pub struct Harness {
    pub backend: Arc<MemoryJobBackend>,
    pub events: Arc<TestEvents>,
    pub registry: SharedTaskRegistry,
    pub gateway: Gateway,
}

impl Harness {
    /// Harness over the production registry.
    pub fn new() -> Self {
        Self::with_registry(build_registry().unwrap())
    }

    /// Harness over a custom registry (extra or missing kinds).
    pub fn with_registry(registry: TaskRegistry) -> Self {
        let backend = Arc::new(MemoryJobBackend::new());
        let events = Arc::new(TestEvents::new());
        let registry: SharedTaskRegistry = Arc::new(registry);
        let gateway = Gateway::new(
            registry.clone(),
            backend.clone(),
            backend.clone(),
            events.clone(),
        );
        Self {
            backend,
            events,
            registry,
            gateway,
        }
    }

    /// A worker on the same backend, draining up to 10 messages per poll.
    pub fn worker(&self, worker_id: &str) -> TaskWorker {
        let mut config = TaskWorkerConfig::with_worker_id(worker_id);
        config.batch_size = 10;
        TaskWorker::with_config(
            self.backend.clone(),
            self.backend.clone(),
            self.registry.clone(),
            Arc::new(TaskContext {
                storage_dir: PathBuf::from("/tmp/tracklab-test"),
            }),
            self.events.clone(),
            config,
        )
    }
}
