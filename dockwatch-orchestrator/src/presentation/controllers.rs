//! HTTP controllers

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};

use crate::application::errors::BAD_SCAN_ID;
use crate::application::{
    AdmissionController, ApplicationError, MonitoringSessionManager, ScanHistoryService,
};
use crate::domain::ScanRecord;
use crate::presentation::models::{
    ContainerCheckResponse, ErrorResponse, HealthResponse, HistoryQuery, ImageCheckResponse,
    MonitoringStartedResponse, SortedJson,
};

/// Application state shared by all handlers
#[derive(Clone)]
pub struct OrchestratorState {
    pub admission: Arc<AdmissionController>,
    pub monitoring: Arc<MonitoringSessionManager>,
    pub history: Arc<ScanHistoryService>,
}

/// Path parameters that do not decode (invalid percent-encoding or UTF-8)
/// are handed on as empty, so each operation answers with its own message
/// and capability checks still run first.
fn path_param(path: Result<Path<String>, PathRejection>) -> String {
    match path {
        Ok(Path(value)) => value,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Undecodable path parameter");
            String::new()
        }
    }
}

/// Analyze a docker image
///
/// Answers from history when a non-failed analysis of the same digest exists,
/// otherwise records a new analysis and queues it.
#[utoipa::path(
    post,
    path = "/v1/check/images/{image_name}",
    tag = "check",
    params(("image_name" = String, Path, description = "Image reference, optionally with tag")),
    responses(
        (status = 202, description = "Analysis accepted or answered from history", body = ImageCheckResponse),
        (status = 400, description = "Bad image name", body = ErrorResponse),
        (status = 404, description = "Image name not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn check_image(
    State(state): State<OrchestratorState>,
    image_name: Result<Path<String>, PathRejection>,
) -> Result<SortedJson, ApplicationError> {
    let image_name = path_param(image_name);
    let admission = state.admission.admit_image_scan(&image_name).await?;
    Ok(SortedJson::accepted(&ImageCheckResponse::from(admission)))
}

/// `/v1/check/images/` with no name
pub async fn check_image_without_name(
    State(state): State<OrchestratorState>,
) -> Result<SortedJson, ApplicationError> {
    check_image(State(state), Ok(Path(String::new()))).await
}

/// Analyze the image of a running container
#[utoipa::path(
    post,
    path = "/v1/check/containers/{container_id}",
    tag = "check",
    params(("container_id" = String, Path, description = "Container id or name")),
    responses(
        (status = 202, description = "Analysis accepted", body = ContainerCheckResponse),
        (status = 400, description = "Bad container id", body = ErrorResponse),
        (status = 404, description = "Container Id not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn check_container(
    State(state): State<OrchestratorState>,
    container_id: Result<Path<String>, PathRejection>,
) -> Result<SortedJson, ApplicationError> {
    let container_id = path_param(container_id);
    let admission = state.admission.admit_container_scan(&container_id).await?;
    Ok(SortedJson::accepted(&ContainerCheckResponse::from(admission)))
}

/// `/v1/check/containers/` with no id
pub async fn check_container_without_id(
    State(state): State<OrchestratorState>,
) -> Result<SortedJson, ApplicationError> {
    check_container(State(state), Ok(Path(String::new()))).await
}

/// Start runtime monitoring of a container
#[utoipa::path(
    post,
    path = "/v1/monitor/containers/{container_id}/start",
    tag = "monitor",
    params(("container_id" = String, Path, description = "Container id or name")),
    responses(
        (status = 202, description = "Monitoring started", body = MonitoringStartedResponse),
        (status = 400, description = "Bad container id, or monitoring already started", body = ErrorResponse),
        (status = 404, description = "Container Id not found", body = ErrorResponse),
        (status = 503, description = "Behaviour analysis service unavailable", body = ErrorResponse)
    )
)]
pub async fn start_monitoring(
    State(state): State<OrchestratorState>,
    container_id: Result<Path<String>, PathRejection>,
) -> Result<SortedJson, ApplicationError> {
    let container_id = path_param(container_id);
    let started = state.monitoring.start_monitoring(&container_id).await?;
    Ok(SortedJson::accepted(&MonitoringStartedResponse::from(started)))
}

/// Stop runtime monitoring of a container and return the closed session
#[utoipa::path(
    post,
    path = "/v1/monitor/containers/{container_id}/stop",
    tag = "monitor",
    params(("container_id" = String, Path, description = "Container id or name")),
    responses(
        (status = 200, description = "Monitoring stopped", body = ScanRecord),
        (status = 400, description = "Bad container id, or no monitoring started", body = ErrorResponse),
        (status = 404, description = "Container Id not found", body = ErrorResponse),
        (status = 503, description = "Behaviour analysis service unavailable", body = ErrorResponse)
    )
)]
pub async fn stop_monitoring(
    State(state): State<OrchestratorState>,
    container_id: Result<Path<String>, PathRejection>,
) -> Result<SortedJson, ApplicationError> {
    let container_id = path_param(container_id);
    let record = state.monitoring.stop_monitoring(&container_id).await?;
    Ok(SortedJson::ok(&record))
}

/// Scan history of an image
#[utoipa::path(
    get,
    path = "/v1/history/{image_name}",
    tag = "history",
    params(
        ("image_name" = String, Path, description = "Image reference as it was checked"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "History, most recent first", body = Vec<ScanRecord>),
        (status = 400, description = "Bad image name or scan id", body = ErrorResponse),
        (status = 404, description = "History not found", body = ErrorResponse)
    )
)]
pub async fn get_history(
    State(state): State<OrchestratorState>,
    image_name: Result<Path<String>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<SortedJson, ApplicationError> {
    let image_name = path_param(image_name);
    let Query(query) = query.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Undecodable history query");
        ApplicationError::InvalidInput(BAD_SCAN_ID.to_string())
    })?;
    let records = state
        .history
        .history(&image_name, query.id.as_deref())
        .await?;
    Ok(SortedJson::ok(&records))
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is running", body = HealthResponse))
)]
pub async fn health_check(State(state): State<OrchestratorState>) -> SortedJson {
    SortedJson::ok(&HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        runtime_analysis_enabled: state.monitoring.is_enabled(),
    })
}

/// Requests matching no route
pub async fn route_not_found(uri: Uri) -> SortedJson {
    tracing::debug!(%uri, "No route for request");
    let status = StatusCode::NOT_FOUND;
    SortedJson::new(
        status,
        &ErrorResponse {
            err: status.as_u16(),
            msg: status.canonical_reason().unwrap_or_default().to_string(),
        },
    )
}
