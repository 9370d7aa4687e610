//! Test doubles for the orchestrator collaborators

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use dockwatch_orchestrator::domain::{
    AnalyzerError, ContainerRuntime, DispatchMessage, HistoryStore, JobQueue, JobQueueError,
    RuntimeAnalyzer, RuntimeClientError, ScanRecordPatch,
};
use dockwatch_orchestrator::infrastructure::InMemoryHistoryStore;

// ── Container runtime ────────────────────────────────────────────────────────

#[derive(Default)]
struct RuntimeState {
    /// Reference -> digest, for every image the fake engine knows about
    images: HashMap<String, String>,
    /// References present locally
    local: HashSet<String>,
    /// Container id -> image name
    containers: HashMap<String, String>,
    engine_down: bool,
}

/// Scriptable container engine that records every call
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
    calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub async fn add_local_image(&self, reference: &str, digest: &str) {
        let mut state = self.state.lock().await;
        state.images.insert(reference.to_string(), digest.to_string());
        state.local.insert(reference.to_string());
    }

    /// Image available only after a pull
    pub async fn add_remote_image(&self, reference: &str, digest: &str) {
        let mut state = self.state.lock().await;
        state.images.insert(reference.to_string(), digest.to_string());
    }

    /// Simulate a new image being pushed under the same reference
    pub async fn set_digest(&self, reference: &str, digest: &str) {
        self.add_local_image(reference, digest).await;
    }

    pub async fn add_container(&self, container_id: &str, image_name: &str) {
        self.state
            .lock()
            .await
            .containers
            .insert(container_id.to_string(), image_name.to_string());
    }

    /// Every call fails with an engine error
    pub async fn set_engine_down(&self, down: bool) {
        self.state.lock().await.engine_down = down;
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) -> Result<(), RuntimeClientError> {
        self.calls.lock().await.push(call);
        if self.state.lock().await.engine_down {
            return Err(RuntimeClientError::CommandFailed(
                "Cannot connect to the Docker daemon".to_string(),
            ));
        }
        Ok(())
    }

    async fn local_digest(&self, image_name: &str) -> Result<String, RuntimeClientError> {
        let state = self.state.lock().await;
        if !state.local.contains(image_name) {
            return Err(RuntimeClientError::ImageNotFound(image_name.to_string()));
        }
        state
            .images
            .get(image_name)
            .cloned()
            .ok_or_else(|| RuntimeClientError::ImageNotFound(image_name.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists_locally(&self, image_name: &str) -> Result<bool, RuntimeClientError> {
        self.record(format!("exists:{image_name}")).await?;
        Ok(self.state.lock().await.local.contains(image_name))
    }

    async fn pull_image(&self, name: &str, tag: &str) -> Result<(), RuntimeClientError> {
        self.record(format!("pull:{name}:{tag}")).await?;
        let mut state = self.state.lock().await;
        let tagged = format!("{name}:{tag}");
        let digest = state
            .images
            .get(&tagged)
            .or_else(|| state.images.get(name))
            .cloned()
            .ok_or_else(|| RuntimeClientError::PullFailed {
                reference: tagged.clone(),
                reason: "manifest unknown".to_string(),
            })?;
        state.images.insert(name.to_string(), digest.clone());
        state.images.insert(tagged.clone(), digest);
        state.local.insert(name.to_string());
        state.local.insert(tagged);
        Ok(())
    }

    async fn inspect_image(&self, image_name: &str) -> Result<Value, RuntimeClientError> {
        self.record(format!("inspect:{image_name}")).await?;
        let digest = self.local_digest(image_name).await?;
        Ok(json!({
            "Id": digest,
            "RepoTags": [image_name],
            "Os": "linux",
        }))
    }

    async fn image_digest(&self, image_name: &str) -> Result<String, RuntimeClientError> {
        self.record(format!("digest:{image_name}")).await?;
        self.local_digest(image_name).await
    }

    async fn image_name_for_container(
        &self,
        container_id: &str,
    ) -> Result<String, RuntimeClientError> {
        self.record(format!("container:{container_id}")).await?;
        self.state
            .lock()
            .await
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| RuntimeClientError::ContainerNotFound(container_id.to_string()))
    }
}

// ── Job queue ────────────────────────────────────────────────────────────────

/// Queue that keeps every dispatched message
#[derive(Default)]
pub struct RecordingQueue {
    messages: Mutex<Vec<DispatchMessage>>,
    unavailable: AtomicBool,
    stalled: AtomicBool,
}

impl RecordingQueue {
    pub async fn messages(&self) -> Vec<DispatchMessage> {
        self.messages.lock().await.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// While stalled, `enqueue` never completes
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), JobQueueError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(JobQueueError::Backend("connection refused".to_string()));
        }
        self.messages.lock().await.push(message);
        Ok(())
    }
}

// ── Behaviour analyzer ───────────────────────────────────────────────────────

/// Analyzer that writes a fixed set of findings into the active session
pub struct RecordingAnalyzer {
    store: Arc<InMemoryHistoryStore>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingAnalyzer {
    pub fn new(store: Arc<InMemoryHistoryStore>) -> Self {
        Self {
            store,
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn findings() -> Value {
        json!([{ "rule": "Terminal shell in container", "priority": "Notice" }])
    }
}

#[async_trait]
impl RuntimeAnalyzer for RecordingAnalyzer {
    async fn update_runtime_monitoring_analysis(
        &self,
        container_id: &str,
    ) -> Result<(), AnalyzerError> {
        self.calls.lock().await.push(container_id.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(AnalyzerError {
                container_id: container_id.to_string(),
                reason: "event source unreachable".to_string(),
            });
        }

        let error = |e: &dyn std::fmt::Display| AnalyzerError {
            container_id: container_id.to_string(),
            reason: e.to_string(),
        };
        if let Some(session) = self
            .store
            .find_started_monitoring(container_id)
            .await
            .map_err(|e| error(&e))?
        {
            self.store
                .update_by_id(
                    session.id,
                    ScanRecordPatch {
                        anomalous_activities_detected: Some(Self::findings()),
                        ..ScanRecordPatch::default()
                    },
                )
                .await
                .map_err(|e| error(&e))?;
        }
        Ok(())
    }
}
