//! Admission of static image and container scans.
//!
//! ```text
//! Controller      AdmissionController     ContainerRuntime   HistoryStore   JobQueue
//!     │                   │                      │                │             │
//!     ├─ image check ────►│── exists / pull ────►│                │             │
//!     │                   │── inspect, digest ──►│                │             │
//!     │                   │── lookup (name, digest) ─────────────►│             │
//!     │                   │   cache hit? ── yes ──► reply with history          │
//!     │                   │── insert if absent ──────────────────►│             │
//!     │                   │── check_image ──────────────────────────────────────►│
//!     │◄── Accepted ──────┤                      │                │             │
//! ```
//!
//! Storing a record and dispatching its job run on a spawned task. A request
//! dropped mid-way (client disconnect, request timeout) therefore never leaves
//! a stored record without either a queued job or a `Failed` status.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{Instrument, error, info, instrument, warn};

use crate::application::errors::{
    ApplicationError, BAD_CONTAINER_ID, BAD_IMAGE_NAME, CONTAINER_NOT_FOUND, IMAGE_NOT_FOUND,
    INTERNAL_ERROR,
};
use crate::domain::{
    ContainerId, ContainerRuntime, DispatchMessage, HistoryStore, ImageReference, InsertOutcome,
    JobQueue, NewScanRecord, RuntimeClientError, ScanId, ScanRecord, ScanRecordPatch,
    now_epoch_seconds,
};

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// How an image check was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// A non-failed analysis of the same digest exists; nothing was queued
    CacheHit,
    /// A new record was stored and a job dispatched
    Accepted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAdmission {
    pub id: ScanId,
    pub outcome: AdmissionOutcome,
    pub message: String,
    pub metadata: Value,
    pub image_digest: String,
    /// Prior analyses of the same digest, most recent first.
    /// Always present on a cache hit; present on acceptance only when
    /// earlier attempts failed.
    pub history: Option<Vec<ScanRecord>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerAdmission {
    pub id: ScanId,
    pub image_name: String,
    pub message: String,
}

/// Decides whether a scan request becomes new work or is answered from history
pub struct AdmissionController {
    runtime: Arc<dyn ContainerRuntime>,
    history: Arc<dyn HistoryStore>,
    dispatcher: Dispatcher,
    default_tag: String,
}

impl AdmissionController {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        history: Arc<dyn HistoryStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            runtime,
            dispatcher: Dispatcher {
                history: history.clone(),
                queue,
                timeout: DEFAULT_DISPATCH_TIMEOUT,
            },
            history,
            default_tag: DEFAULT_TAG.to_string(),
        }
    }

    /// Longest wait for the queue to accept one job
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.timeout = timeout;
        self
    }

    /// Tag pulled when a reference carries none
    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = tag.into();
        self
    }

    #[instrument(skip(self))]
    pub async fn admit_image_scan(
        &self,
        image_name: &str,
    ) -> Result<ImageAdmission, ApplicationError> {
        let reference = ImageReference::parse(image_name)
            .map_err(|_| ApplicationError::InvalidInput(BAD_IMAGE_NAME.to_string()))?;

        let pulled = self.ensure_local(&reference).await?;
        let image_name = reference.as_str();

        let metadata = self
            .runtime
            .inspect_image(image_name)
            .await
            .map_err(|e| image_resolution_error(image_name, e))?;
        let image_digest = self
            .runtime
            .image_digest(image_name)
            .await
            .map_err(|e| image_resolution_error(image_name, e))?;

        let history = self
            .history
            .find_by_image_and_digest(image_name, &image_digest)
            .await?;

        if let Some(latest) = history.first()
            && latest.satisfies_cache_lookup()
        {
            info!(
                image_name,
                image_digest = %image_digest,
                scan_id = %latest.id,
                status = %latest.status,
                "Analysis with matching digest already exists"
            );
            return Ok(cache_hit(latest.id, image_name, metadata, image_digest, history));
        }

        let record = NewScanRecord::image_scan(
            image_name,
            now_epoch_seconds(),
            image_digest.clone(),
            metadata.clone(),
        );

        let dispatcher = self.dispatcher.clone();
        let (job_image, job_digest) = (image_name.to_string(), image_digest.clone());
        let outcome = detached(async move {
            let outcome = dispatcher.history.insert_image_scan_if_absent(record).await?;
            if let InsertOutcome::Inserted(inserted) = &outcome {
                dispatcher
                    .send(DispatchMessage::CheckImage {
                        image_name: job_image,
                        id: inserted.id,
                        pulled,
                        image_digest: job_digest,
                    })
                    .await?;
            }
            Ok::<_, ApplicationError>(outcome)
        })
        .await?;

        let inserted = match outcome {
            InsertOutcome::Existing(existing) => {
                // Lost the race against a concurrent admission of the same digest
                info!(
                    image_name,
                    scan_id = %existing.id,
                    "Concurrent admission already recorded this digest"
                );
                let history = self
                    .history
                    .find_by_image_and_digest(image_name, &image_digest)
                    .await?;
                return Ok(cache_hit(existing.id, image_name, metadata, image_digest, history));
            }
            InsertOutcome::Inserted(record) => record,
        };

        if !history.is_empty() {
            info!(
                image_name,
                failed_attempts = history.len(),
                "Previous analyses of this digest failed, analyzing again"
            );
        }

        info!(image_name, scan_id = %inserted.id, pulled, "Image analysis accepted");

        Ok(ImageAdmission {
            id: inserted.id,
            outcome: AdmissionOutcome::Accepted,
            message: format!("Accepted the analysis of <{}>", image_name),
            metadata,
            image_digest,
            history: (!history.is_empty()).then_some(history),
        })
    }

    #[instrument(skip(self))]
    pub async fn admit_container_scan(
        &self,
        container_id: &str,
    ) -> Result<ContainerAdmission, ApplicationError> {
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

        let dispatcher = self.dispatcher.clone();
        let record = NewScanRecord::container_scan(&image_name, now_epoch_seconds());
        let container_id = container.to_string();
        let record = detached(async move {
            let record = dispatcher.history.insert(record).await?;
            dispatcher
                .send(DispatchMessage::CheckContainer {
                    container_id,
                    id: record.id,
                })
                .await?;
            Ok::<_, ApplicationError>(record)
        })
        .await?;

        info!(
            container_id = %container,
            image_name = %image_name,
            scan_id = %record.id,
            "Container analysis accepted"
        );

        Ok(ContainerAdmission {
            id: record.id,
            message: format!(
                "Accepted the analysis of <{}> with id: {}",
                image_name, container
            ),
            image_name,
        })
    }

    /// Make the image available locally, pulling it when needed.
    /// Returns whether a pull happened.
    async fn ensure_local(&self, reference: &ImageReference) -> Result<bool, ApplicationError> {
        let exists = self
            .runtime
            .image_exists_locally(reference.as_str())
            .await
            .map_err(|e| image_resolution_error(reference.as_str(), e))?;
        if exists {
            return Ok(false);
        }

        let tag = reference.tag().unwrap_or(&self.default_tag);
        info!(repository = reference.repository(), tag, "Pulling image");
        self.runtime
            .pull_image(reference.repository(), tag)
            .await
            .map_err(|e| {
                error!(
                    image_name = reference.as_str(),
                    error_kind = e.kind(),
                    error = %e,
                    "Unexpected error while pulling the docker image"
                );
                ApplicationError::NotFound(IMAGE_NOT_FOUND.to_string())
            })?;
        Ok(true)
    }
}

/// Hands jobs to the queue on behalf of freshly stored records
#[derive(Clone)]
struct Dispatcher {
    history: Arc<dyn HistoryStore>,
    queue: Arc<dyn JobQueue>,
    timeout: Duration,
}

impl Dispatcher {
    /// Enqueue a job. When the queue rejects it or does not accept it in
    /// time, the stored record is marked failed so the next request for the
    /// same target is not answered from a record no worker will pick up.
    async fn send(&self, message: DispatchMessage) -> Result<(), ApplicationError> {
        let id = message.scan_id();
        let kind = message.kind();
        let reason = match tokio::time::timeout(self.timeout, self.queue.enqueue(message)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(queue_error)) => format!("dispatch failed: {queue_error}"),
            Err(_) => format!("dispatch failed: enqueue timed out after {:?}", self.timeout),
        };

        error!(scan_id = %id, message_kind = kind, reason = %reason, "Failed to enqueue dispatch message");
        if let Err(store_error) = self
            .history
            .update_by_id(id, ScanRecordPatch::failed(reason))
            .await
        {
            warn!(scan_id = %id, error = %store_error, "Could not mark undispatched scan as failed");
        }
        Err(ApplicationError::Internal(INTERNAL_ERROR.to_string()))
    }
}

/// Run `work` to completion on its own task, even if the caller is dropped
async fn detached<T, F>(work: F) -> Result<T, ApplicationError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ApplicationError>> + Send + 'static,
{
    tokio::spawn(work.in_current_span()).await.map_err(|e| {
        error!(error = %e, "Admission task did not complete");
        ApplicationError::Internal(INTERNAL_ERROR.to_string())
    })?
}

fn cache_hit(
    id: ScanId,
    image_name: &str,
    metadata: Value,
    image_digest: String,
    history: Vec<ScanRecord>,
) -> ImageAdmission {
    ImageAdmission {
        id,
        outcome: AdmissionOutcome::CacheHit,
        message: format!(
            "Analysis of <{}> with matching digest already exists",
            image_name
        ),
        metadata,
        image_digest,
        history: Some(history),
    }
}

/// Missing images become `NotFound`; engine failures stay internal.
fn image_resolution_error(image_name: &str, e: RuntimeClientError) -> ApplicationError {
    if e.is_missing() {
        warn!(image_name, error_kind = e.kind(), error = %e, "Image could not be resolved");
        ApplicationError::NotFound(IMAGE_NOT_FOUND.to_string())
    } else {
        error!(image_name, error_kind = e.kind(), error = %e, "Container runtime failure");
        ApplicationError::Internal(INTERNAL_ERROR.to_string())
    }
}
