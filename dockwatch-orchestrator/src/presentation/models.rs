//! API response models

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

use crate::application::{ContainerAdmission, ImageAdmission, MonitoringStarted};
use crate::domain::{ScanId, ScanRecord};

/// Reply to an image check
#[derive(Debug, Serialize, ToSchema)]
pub struct ImageCheckResponse {
    /// Record that answers this request, new or cached
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: ScanId,

    #[schema(example = "Accepted the analysis of <redis:7>")]
    pub msg: String,

    /// `docker image inspect` output of the resolved image
    #[schema(value_type = Object)]
    pub metadata: Value,

    #[schema(example = "sha256:5f1d8c1e7c2a")]
    pub image_digest: String,

    /// Prior analyses of the same digest, most recent first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ScanRecord>>,
}

impl From<ImageAdmission> for ImageCheckResponse {
    fn from(admission: ImageAdmission) -> Self {
        Self {
            id: admission.id,
            msg: admission.message,
            metadata: admission.metadata,
            image_digest: admission.image_digest,
            history: admission.history,
        }
    }
}

/// Reply to a container check
#[derive(Debug, Serialize, ToSchema)]
pub struct ContainerCheckResponse {
    pub id: ScanId,

    #[schema(example = "Accepted the analysis of <redis:7> with id: 3f2a9c")]
    pub msg: String,
}

impl From<ContainerAdmission> for ContainerCheckResponse {
    fn from(admission: ContainerAdmission) -> Self {
        Self {
            id: admission.id,
            msg: admission.message,
        }
    }
}

/// Reply to a monitoring start
#[derive(Debug, Serialize, ToSchema)]
pub struct MonitoringStartedResponse {
    pub id: ScanId,

    #[schema(example = "redis:7")]
    pub image_name: String,

    #[schema(example = "Monitoring of docker container with id <3f2a9c> started")]
    pub msg: String,
}

impl From<MonitoringStarted> for MonitoringStartedResponse {
    fn from(started: MonitoringStarted) -> Self {
        Self {
            id: started.id,
            image_name: started.image_name,
            msg: started.message,
        }
    }
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status code
    #[schema(example = 404)]
    pub err: u16,

    #[schema(example = "Image name not found")]
    pub msg: String,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,

    #[schema(example = "0.1.0")]
    pub version: String,

    /// Whether monitoring sessions can be started
    pub runtime_analysis_enabled: bool,
}

/// Query string of the history endpoint
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Restrict the history to a single record
    pub id: Option<String>,
}

/// JSON reply whose object keys are emitted in sorted order at every depth
#[derive(Debug)]
pub struct SortedJson {
    status: StatusCode,
    body: Value,
}

impl SortedJson {
    pub fn new<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self {
                status,
                body: sort_keys(value),
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &ErrorResponse {
                        err: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        msg: "Internal server error".to_string(),
                    },
                )
            }
        }
    }

    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn accepted<T: Serialize>(body: &T) -> Self {
        Self::new(StatusCode::ACCEPTED, body)
    }
}

impl IntoResponse for SortedJson {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Rebuild every object with its keys inserted in lexicographic order, so the
/// output is sorted whether or not `serde_json` preserves insertion order.
pub fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
