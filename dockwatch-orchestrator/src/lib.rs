//! Dockwatch Orchestrator - scan admission and runtime monitoring control
//!
//! Decides whether an image or container scan request becomes new analysis
//! work or is answered from the scan history, and manages the lifecycle of
//! runtime monitoring sessions.
//!
//! # Layers
//!
//! - [`domain`]: scan records, the status machine and collaborator traits
//!   ([`ContainerRuntime`](domain::ContainerRuntime),
//!   [`HistoryStore`](domain::HistoryStore), [`JobQueue`](domain::JobQueue),
//!   [`RuntimeAnalyzer`](domain::RuntimeAnalyzer))
//! - [`application`]: [`AdmissionController`](application::AdmissionController),
//!   [`MonitoringSessionManager`](application::MonitoringSessionManager) and
//!   history queries
//! - [`infrastructure`]: docker CLI runtime, in-memory and PostgreSQL history
//!   stores, in-process and Dragonfly job queues
//! - [`presentation`]: axum routes, controllers and response models
//!
//! Collaborators are injected as `Arc<dyn Trait>`; nothing is global.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::{AdmissionController, ApplicationError, MonitoringSessionManager};
pub use presentation::{ApiDoc, OrchestratorState, create_router};
