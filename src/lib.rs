//! Dockwatch - main application library
//!
//! Wires configuration, storage and queue backends, and the orchestrator
//! router into a runnable application.

mod app;

pub use app::{AppHandle, create_app};
pub use dockwatch_core::{Config, init_tracing};
pub use dockwatch_orchestrator::presentation::OrchestratorState;

pub use dockwatch_core;
pub use dockwatch_orchestrator;
