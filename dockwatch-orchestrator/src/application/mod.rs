//! Orchestrator application layer

pub mod admission;
pub mod errors;
pub mod history;
pub mod monitoring;

pub use admission::{AdmissionController, AdmissionOutcome, ContainerAdmission, ImageAdmission};
pub use errors::ApplicationError;
pub use history::ScanHistoryService;
pub use monitoring::{MonitoringSessionManager, MonitoringStarted};
