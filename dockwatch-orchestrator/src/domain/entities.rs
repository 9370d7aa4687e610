//! Orchestrator domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::value_objects::{ScanId, ScanStatus, StatusTransitionError};

/// Seconds since the Unix epoch with sub-second precision, the timestamp unit
/// used throughout the scan history.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub fn now_epoch_seconds() -> f64 {
    epoch_seconds(Utc::now())
}

/// Runtime behaviour analysis attached to a monitoring record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RuntimeAnalysis {
    pub container_id: String,
    pub start_timestamp: f64,
    /// `null` while the session is running
    pub stop_timestamp: Option<f64>,
    /// Filled in by the behaviour analyzer, `null` until then
    #[schema(value_type = Option<Object>)]
    pub anomalous_activities_detected: Option<Value>,
}

impl RuntimeAnalysis {
    pub fn started(container_id: impl Into<String>, start_timestamp: f64) -> Self {
        Self {
            container_id: container_id.into(),
            start_timestamp,
            stop_timestamp: None,
            anomalous_activities_detected: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_timestamp.is_none()
    }
}

/// A single entry of the scan history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanRecord {
    pub id: ScanId,
    pub image_name: String,
    pub timestamp: f64,
    pub status: ScanStatus,
    /// Failure detail, present only for `Failed` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_analysis: Option<RuntimeAnalysis>,
}

/// Reasons a [`ScanRecordPatch`] cannot be applied to a record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordUpdateError {
    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),

    #[error("record {0} is not a monitoring session")]
    NotAMonitoringSession(ScanId),

    #[error("monitoring session {0} was already stopped")]
    AlreadyStopped(ScanId),
}

impl ScanRecord {
    /// Whether this record is an active monitoring session.
    pub fn is_started_monitoring(&self) -> bool {
        self.status == ScanStatus::Monitoring
            && self
                .runtime_analysis
                .as_ref()
                .is_some_and(RuntimeAnalysis::is_running)
    }

    /// Whether this record can answer a repeated image check without new work.
    pub fn satisfies_cache_lookup(&self) -> bool {
        !self.status.is_failure()
    }

    pub fn container_id(&self) -> Option<&str> {
        self.runtime_analysis
            .as_ref()
            .map(|analysis| analysis.container_id.as_str())
    }

    /// Apply `patch`, enforcing the status machine and the stop-once rule.
    /// The record is left untouched on error.
    pub fn apply(&mut self, patch: &ScanRecordPatch) -> Result<(), RecordUpdateError> {
        if let Some(target) = patch.status
            && target != self.status
            && !self.status.can_transition_to(&target)
        {
            return Err(StatusTransitionError {
                from: self.status,
                to: target,
            }
            .into());
        }

        if patch.stop_timestamp.is_some() || patch.anomalous_activities_detected.is_some() {
            let Some(analysis) = self.runtime_analysis.as_ref() else {
                return Err(RecordUpdateError::NotAMonitoringSession(self.id));
            };
            if patch.stop_timestamp.is_some() && !analysis.is_running() {
                return Err(RecordUpdateError::AlreadyStopped(self.id));
            }
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if let Some(analysis) = self.runtime_analysis.as_mut() {
            if let Some(stop) = patch.stop_timestamp {
                analysis.stop_timestamp = Some(stop);
            }
            if let Some(activities) = &patch.anomalous_activities_detected {
                analysis.anomalous_activities_detected = Some(activities.clone());
            }
        }
        Ok(())
    }
}

/// Field values for a record that has not been stored yet.
/// The history store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScanRecord {
    pub image_name: String,
    pub timestamp: f64,
    pub status: ScanStatus,
    pub image_digest: Option<String>,
    pub metadata: Option<Value>,
    pub runtime_analysis: Option<RuntimeAnalysis>,
}

impl NewScanRecord {
    /// Static analysis of a resolved image
    pub fn image_scan(
        image_name: impl Into<String>,
        timestamp: f64,
        image_digest: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            timestamp,
            status: ScanStatus::Analyzing,
            image_digest: Some(image_digest.into()),
            metadata: Some(metadata),
            runtime_analysis: None,
        }
    }

    /// Static analysis of a running container
    pub fn container_scan(image_name: impl Into<String>, timestamp: f64) -> Self {
        Self {
            image_name: image_name.into(),
            timestamp,
            status: ScanStatus::Analyzing,
            image_digest: None,
            metadata: None,
            runtime_analysis: None,
        }
    }

    /// Runtime monitoring session, started now
    pub fn monitoring(
        image_name: impl Into<String>,
        container_id: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            timestamp,
            status: ScanStatus::Monitoring,
            image_digest: None,
            metadata: None,
            runtime_analysis: Some(RuntimeAnalysis::started(container_id, timestamp)),
        }
    }

    pub fn into_record(self, id: ScanId) -> ScanRecord {
        ScanRecord {
            id,
            image_name: self.image_name,
            timestamp: self.timestamp,
            status: self.status,
            error: None,
            image_digest: self.image_digest,
            metadata: self.metadata,
            runtime_analysis: self.runtime_analysis,
        }
    }
}

/// Partial update of a stored record. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRecordPatch {
    pub status: Option<ScanStatus>,
    pub error: Option<String>,
    pub stop_timestamp: Option<f64>,
    pub anomalous_activities_detected: Option<Value>,
}

impl ScanRecordPatch {
    /// Close a monitoring session
    pub fn stop_monitoring(stop_timestamp: f64) -> Self {
        Self {
            status: Some(ScanStatus::Completed),
            stop_timestamp: Some(stop_timestamp),
            ..Self::default()
        }
    }

    /// Mark an analysis as failed with a human-readable cause
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ScanStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Work item handed to the analysis workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum DispatchMessage {
    CheckImage {
        image_name: String,
        #[serde(rename = "_id")]
        id: ScanId,
        pulled: bool,
        image_digest: String,
    },
    CheckContainer {
        container_id: String,
        #[serde(rename = "_id")]
        id: ScanId,
    },
}

impl DispatchMessage {
    pub fn scan_id(&self) -> ScanId {
        match self {
            Self::CheckImage { id, .. } | Self::CheckContainer { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckImage { .. } => "check_image",
            Self::CheckContainer { .. } => "check_container",
        }
    }
}
