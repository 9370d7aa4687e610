//! Application-level errors and the user-facing messages they carry

use crate::domain::{HistoryStoreError, JobQueueError};

pub const BAD_IMAGE_NAME: &str = "Bad image name";
pub const BAD_CONTAINER_ID: &str = "Bad container id";
pub const BAD_SCAN_ID: &str = "Bad scan id";
pub const IMAGE_NOT_FOUND: &str = "Image name not found";
pub const CONTAINER_NOT_FOUND: &str = "Container Id not found";
pub const HISTORY_NOT_FOUND: &str = "History not found";
pub const ANALYSIS_UNAVAILABLE: &str = "Behaviour analysis service unavailable";
pub const MONITORING_ALREADY_STARTED: &str =
    "The monitoring for the requested container id is already started";
pub const MONITORING_NOT_STARTED: &str = "There is not monitoring for the requested container id";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Errors surfaced by the admission and monitoring use cases.
///
/// The display string is the message returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplicationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApplicationError {
    /// HTTP status for this error. Conflicts are reported as 400 on the wire.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::Conflict(_) => 400,
            Self::NotFound(_) => 404,
            Self::ServiceUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::ServiceUnavailable(msg)
            | Self::Internal(msg) => msg,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

// Storage and queue details are logged where they happen; clients only see
// a generic message.
impl From<HistoryStoreError> for ApplicationError {
    fn from(e: HistoryStoreError) -> Self {
        tracing::error!(error = %e, "History store operation failed");
        Self::Internal(INTERNAL_ERROR.to_string())
    }
}

impl From<JobQueueError> for ApplicationError {
    fn from(e: JobQueueError) -> Self {
        tracing::error!(error = %e, "Failed to dispatch analysis job");
        Self::Internal(INTERNAL_ERROR.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApplicationError::InvalidInput(BAD_IMAGE_NAME.into()), 400)]
    #[case(ApplicationError::Conflict(MONITORING_ALREADY_STARTED.into()), 400)]
    #[case(ApplicationError::NotFound(CONTAINER_NOT_FOUND.into()), 404)]
    #[case(ApplicationError::ServiceUnavailable(ANALYSIS_UNAVAILABLE.into()), 503)]
    #[case(ApplicationError::Internal(INTERNAL_ERROR.into()), 500)]
    fn test_status_codes(#[case] error: ApplicationError, #[case] status: u16) {
        assert_eq!(error.status_code(), status);
        assert_eq!(error.to_string(), error.message());
    }
}
