//! Orchestrator infrastructure layer

pub mod analyzer;
pub mod docker;
pub mod history_store;
pub mod job_queue;

pub use analyzer::NoopRuntimeAnalyzer;
pub use docker::{DockerCliConfig, DockerCliRuntime};
pub use history_store::{InMemoryHistoryStore, PgHistoryStore};
pub use job_queue::{DragonflyJobQueue, InMemoryJobQueue, spawn_dispatch_logger};
