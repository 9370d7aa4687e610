//! Collaborator traits the orchestrator depends on

use async_trait::async_trait;
use serde_json::Value;

use super::entities::{DispatchMessage, NewScanRecord, ScanRecord, ScanRecordPatch};
use super::value_objects::ScanId;

/// Container runtime errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeClientError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("failed to pull image '{reference}': {reason}")]
    PullFailed { reference: String, reason: String },

    #[error("docker command timed out after {0} seconds")]
    Timeout(u64),

    #[error("docker command failed: {0}")]
    CommandFailed(String),

    #[error("unexpected docker output: {0}")]
    InvalidOutput(String),
}

impl RuntimeClientError {
    /// Short classification used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageNotFound(_) => "image_not_found",
            Self::ContainerNotFound(_) => "container_not_found",
            Self::PullFailed { .. } => "pull_failed",
            Self::Timeout(_) => "timeout",
            Self::CommandFailed(_) => "command_failed",
            Self::InvalidOutput(_) => "invalid_output",
        }
    }

    /// Whether the error means the requested object does not exist
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Self::ImageNotFound(_) | Self::ContainerNotFound(_) | Self::PullFailed { .. }
        )
    }
}

/// Resolves images and containers against the local container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists_locally(&self, image_name: &str) -> Result<bool, RuntimeClientError>;

    /// Pull `name` at `tag`. A tag beginning with `sha256:` is a pinned digest.
    async fn pull_image(&self, name: &str, tag: &str) -> Result<(), RuntimeClientError>;

    async fn inspect_image(&self, image_name: &str) -> Result<Value, RuntimeClientError>;

    async fn image_digest(&self, image_name: &str) -> Result<String, RuntimeClientError>;

    async fn image_name_for_container(
        &self,
        container_id: &str,
    ) -> Result<String, RuntimeClientError>;
}

/// Scan history storage errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryStoreError {
    #[error("scan record {0} not found")]
    NotFound(ScanId),

    #[error("rejected update of scan record {id}: {reason}")]
    InvalidUpdate { id: ScanId, reason: String },

    #[error("corrupt scan record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for HistoryStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Result of a conditional insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The record was stored
    Inserted(ScanRecord),
    /// A conflicting record already existed, nothing was stored
    Existing(ScanRecord),
}

/// Persistent scan history
///
/// Every list returned by a lookup is ordered most recent first
/// (by `timestamp`, then by insertion order).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Unconditionally store a record
    async fn insert(&self, record: NewScanRecord) -> Result<ScanRecord, HistoryStoreError>;

    /// Store an image scan unless a non-failed record for the same
    /// `(image_name, image_digest)` exists. Check and insert are atomic.
    async fn insert_image_scan_if_absent(
        &self,
        record: NewScanRecord,
    ) -> Result<InsertOutcome, HistoryStoreError>;

    /// Store a monitoring session unless one is already started for the
    /// same container. Check and insert are atomic.
    async fn insert_monitoring_if_absent(
        &self,
        record: NewScanRecord,
    ) -> Result<InsertOutcome, HistoryStoreError>;

    /// Apply `patch` to the record with `id`. Patches that violate the
    /// status machine or stop a session twice fail with `InvalidUpdate`.
    async fn update_by_id(
        &self,
        id: ScanId,
        patch: ScanRecordPatch,
    ) -> Result<ScanRecord, HistoryStoreError>;

    async fn find_by_image_and_digest(
        &self,
        image_name: &str,
        image_digest: &str,
    ) -> Result<Vec<ScanRecord>, HistoryStoreError>;

    async fn find_started_monitoring(
        &self,
        container_id: &str,
    ) -> Result<Option<ScanRecord>, HistoryStoreError>;

    async fn find_history(
        &self,
        image_name: &str,
        id: Option<ScanId>,
    ) -> Result<Vec<ScanRecord>, HistoryStoreError>;
}

/// Job queue errors
#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    #[error("job queue is full")]
    Full,

    #[error("job queue is closed")]
    Closed,

    #[error("failed to serialize dispatch message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to enqueue dispatch message: {0}")]
    Backend(String),
}

/// Hands dispatch messages to the analysis workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), JobQueueError>;
}

/// Behaviour analyzer errors
#[derive(Debug, thiserror::Error)]
#[error("runtime analysis update failed for container {container_id}: {reason}")]
pub struct AnalyzerError {
    pub container_id: String,
    pub reason: String,
}

/// Folds the behaviour events collected for a container into its active
/// monitoring record
#[async_trait]
pub trait RuntimeAnalyzer: Send + Sync {
    async fn update_runtime_monitoring_analysis(
        &self,
        container_id: &str,
    ) -> Result<(), AnalyzerError>;
}
