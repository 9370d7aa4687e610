//! Shared harness for orchestrator integration tests

#![allow(dead_code)]

pub mod doubles;

use std::sync::Arc;
use std::time::Duration;

use dockwatch_orchestrator::application::{
    AdmissionController, MonitoringSessionManager, ScanHistoryService,
};
use dockwatch_orchestrator::domain::{ContainerRuntime, HistoryStore, JobQueue, RuntimeAnalyzer};
use dockwatch_orchestrator::infrastructure::InMemoryHistoryStore;
use dockwatch_orchestrator::presentation::OrchestratorState;

use doubles::{FakeRuntime, RecordingAnalyzer, RecordingQueue};

/// All collaborators wired together, with handles kept for assertions
pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub store: Arc<InMemoryHistoryStore>,
    pub queue: Arc<RecordingQueue>,
    pub analyzer: Arc<RecordingAnalyzer>,
    pub admission: Arc<AdmissionController>,
    pub monitoring: Arc<MonitoringSessionManager>,
    pub history: Arc<ScanHistoryService>,
}

impl Harness {
    pub fn new(runtime_analysis_enabled: bool) -> Self {
        let runtime = Arc::new(FakeRuntime::default());
        let store = Arc::new(InMemoryHistoryStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let analyzer = Arc::new(RecordingAnalyzer::new(store.clone()));

        let admission = Arc::new(AdmissionController::new(
            runtime.clone() as Arc<dyn ContainerRuntime>,
            store.clone() as Arc<dyn HistoryStore>,
            queue.clone() as Arc<dyn JobQueue>,
        ));
        let monitoring = Arc::new(MonitoringSessionManager::new(
            runtime.clone() as Arc<dyn ContainerRuntime>,
            store.clone() as Arc<dyn HistoryStore>,
            analyzer.clone() as Arc<dyn RuntimeAnalyzer>,
            runtime_analysis_enabled,
        ));
        let history = Arc::new(ScanHistoryService::new(
            store.clone() as Arc<dyn HistoryStore>
        ));

        Self {
            runtime,
            store,
            queue,
            analyzer,
            admission,
            monitoring,
            history,
        }
    }

    /// A second controller over the same collaborators with a custom dispatch timeout
    pub fn admission_with_dispatch_timeout(&self, timeout: Duration) -> AdmissionController {
        AdmissionController::new(
            self.runtime.clone() as Arc<dyn ContainerRuntime>,
            self.store.clone() as Arc<dyn HistoryStore>,
            self.queue.clone() as Arc<dyn JobQueue>,
        )
        .with_dispatch_timeout(timeout)
    }

    pub fn state(&self) -> OrchestratorState {
        OrchestratorState {
            admission: self.admission.clone(),
            monitoring: self.monitoring.clone(),
            history: self.history.clone(),
        }
    }
}
