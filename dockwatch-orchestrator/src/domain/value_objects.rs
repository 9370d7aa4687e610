//! Orchestrator value objects

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Store-assigned identifier of a [`ScanRecord`](super::entities::ScanRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ScanId(Uuid);

impl ScanId {
    /// Allocate a fresh identifier. Only history stores call this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for ScanId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ScanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Scan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ScanStatus {
    /// Accepted and handed to the analysis workers
    Analyzing,
    /// Runtime monitoring session in progress
    Monitoring,
    /// Analysis or monitoring finished
    Completed,
    /// Analysis failed; detail lives in the record's `error` field
    Failed,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        Self::Analyzing,
        Self::Monitoring,
        Self::Completed,
        Self::Failed,
    ];

    /// Returns the set of valid target states from the current state.
    ///
    /// ```text
    /// Analyzing ──► Completed
    ///     │
    ///     └──────► Failed
    ///
    /// Monitoring ─► Completed
    /// ```
    pub fn valid_transitions(&self) -> &[ScanStatus] {
        match self {
            Self::Analyzing => &[Self::Completed, Self::Failed],
            Self::Monitoring => &[Self::Completed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Check whether transitioning to `target` is allowed from the current state.
    pub fn can_transition_to(&self, target: &ScanStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    /// States from which `target` can be reached in one step.
    pub fn sources_of(target: &ScanStatus) -> Vec<ScanStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(target))
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Failed analyses never satisfy a cache lookup.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "Analyzing",
            Self::Monitoring => "Monitoring",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = UnknownStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatusError(s.to_string()))
    }
}

/// Error returned when a persisted status string is not a known [`ScanStatus`].
#[derive(Debug, thiserror::Error)]
#[error("Unknown scan status '{0}'")]
pub struct UnknownStatusError(pub String);

/// Error returned when an invalid status transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid scan transition from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: ScanStatus,
    pub to: ScanStatus,
}

/// Rejected request identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("malformed image reference '{0}'")]
    MalformedReference(String),
}

/// An image reference as requested by the caller, e.g. `redis`, `redis:7`,
/// `registry.local:5000/team/app:1.2` or `alpine@sha256:…`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    raw: String,
    repository: String,
    tag: Option<String>,
}

impl ImageReference {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let (repository, tag) = if let Some((repository, digest)) = raw.split_once('@') {
            (repository, Some(digest))
        } else {
            // A colon before the last '/' belongs to a registry port, not a tag
            let name_start = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
            match raw[name_start..].rfind(':') {
                Some(i) => (&raw[..name_start + i], Some(&raw[name_start + i + 1..])),
                None => (raw, None),
            }
        };

        if repository.is_empty() || repository.ends_with('/') || tag.is_some_and(str::is_empty)
        {
            return Err(IdentifierError::MalformedReference(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            repository: repository.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    /// The reference exactly as requested (trimmed). Records are keyed on this.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag or pinned digest, if the reference carries one.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Identifier of a running container (full or short id, or name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
