//! Runtime monitoring sessions.
//!
//! A session is a history record in `Monitoring` status whose
//! `runtime_analysis.stop_timestamp` is unset. At most one session per
//! container is active; stopping closes it exactly once.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::application::errors::{
    ANALYSIS_UNAVAILABLE, ApplicationError, BAD_CONTAINER_ID, CONTAINER_NOT_FOUND, INTERNAL_ERROR,
    MONITORING_ALREADY_STARTED, MONITORING_NOT_STARTED,
};
use crate::domain::{
    ContainerId, ContainerRuntime, HistoryStore, HistoryStoreError, InsertOutcome, NewScanRecord,
    RuntimeAnalyzer, ScanId, ScanRecord, ScanRecordPatch, now_epoch_seconds,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringStarted {
    pub id: ScanId,
    pub image_name: String,
    pub message: String,
}

pub struct MonitoringSessionManager {
    runtime: Arc<dyn ContainerRuntime>,
    history: Arc<dyn HistoryStore>,
    analyzer: Arc<dyn RuntimeAnalyzer>,
    enabled: bool,
}

impl MonitoringSessionManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        history: Arc<dyn HistoryStore>,
        analyzer: Arc<dyn RuntimeAnalyzer>,
        enabled: bool,
    ) -> Self {
        Self {
            runtime,
            history,
            analyzer,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip(self))]
    pub async fn start_monitoring(
        &self,
        container_id: &str,
    ) -> Result<MonitoringStarted, ApplicationError> {
        let (container, image_name) = self.resolve(container_id).await?;

        if self
            .history
            .find_started_monitoring(container.as_str())
            .await?
            .is_some()
        {
            return Err(ApplicationError::Conflict(
                MONITORING_ALREADY_STARTED.to_string(),
            ));
        }

        let record = NewScanRecord::monitoring(&image_name, container.as_str(), now_epoch_seconds());
        let session = match self.history.insert_monitoring_if_absent(record).await? {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::Existing(existing) => {
                info!(container_id = %container, scan_id = %existing.id, "Concurrent start already opened a session");
                return Err(ApplicationError::Conflict(
                    MONITORING_ALREADY_STARTED.to_string(),
                ));
            }
        };

        info!(container_id = %container, image_name = %image_name, scan_id = %session.id, "Monitoring started");

        Ok(MonitoringStarted {
            id: session.id,
            message: format!(
                "Monitoring of docker container with id <{}> started",
                container
            ),
            image_name,
        })
    }

    /// Close the active session for `container_id` and return the stored record.
    #[instrument(skip(self))]
    pub async fn stop_monitoring(&self, container_id: &str) -> Result<ScanRecord, ApplicationError> {
        let (container, image_name) = self.resolve(container_id).await?;

        if self
            .history
            .find_started_monitoring(container.as_str())
            .await?
            .is_none()
        {
            return Err(not_started());
        }

        self.analyzer
            .update_runtime_monitoring_analysis(container.as_str())
            .await
            .map_err(|e| {
                error!(container_id = %container, error = %e, "Runtime analysis update failed");
                ApplicationError::Internal(INTERNAL_ERROR.to_string())
            })?;

        // Re-read: the analyzer has written into the session
        let session = self
            .history
            .find_started_monitoring(container.as_str())
            .await?
            .ok_or_else(not_started)?;

        let stopped = match self
            .history
            .update_by_id(session.id, ScanRecordPatch::stop_monitoring(now_epoch_seconds()))
            .await
        {
            Ok(record) => record,
            Err(HistoryStoreError::InvalidUpdate { id, reason }) => {
                info!(scan_id = %id, reason = %reason, "Session was stopped concurrently");
                return Err(not_started());
            }
            Err(e) => return Err(e.into()),
        };

        info!(container_id = %container, scan_id = %stopped.id, "Monitoring stopped");

        let stored = self
            .history
            .find_history(&image_name, Some(stopped.id))
            .await?
            .into_iter()
            .next();

        Ok(stored.unwrap_or_else(|| {
            // The container now reports a different image than when the
            // session was opened
            warn!(
                scan_id = %stopped.id,
                image_name = %image_name,
                recorded_image_name = %stopped.image_name,
                "Stopped session not found under the container's current image"
            );
            stopped
        }))
    }

    async fn resolve(&self, container_id: &str) -> Result<(ContainerId, String), ApplicationError> {
        if !self.enabled {
            return Err(ApplicationError::ServiceUnavailable(
                ANALYSIS_UNAVAILABLE.to_string(),
            ));
        }

        let container = ContainerId::parse(container_id)
            .map_err(|_| ApplicationError::InvalidInput(BAD_CONTAINER_ID.to_string()))?;

        let image_name = self
            .runtime
            .image_name_for_container(container.as_str())
            .await
            .map_err(|e| {
                warn!(
                    container_id = %container,
                    error_kind = e.kind(),
                    error = %e,
                    "Failed to resolve container"
                );
                ApplicationError::NotFound(CONTAINER_NOT_FOUND.to_string())
            })?;

        Ok((container, image_name))
    }
}

fn not_started() -> ApplicationError {
    ApplicationError::Conflict(MONITORING_NOT_STARTED.to_string())
}
