//! Route definitions

use std::time::Duration;

use axum::http::StatusCode;
use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;

use dockwatch_core::config::ServerConfig;

use crate::domain::{RuntimeAnalysis, ScanId, ScanRecord, ScanStatus};
use crate::presentation::controllers::{
    OrchestratorState, check_container, check_container_without_id, check_image,
    check_image_without_name, get_history, health_check, route_not_found, start_monitoring,
    stop_monitoring,
};
use crate::presentation::middleware::ensure_error_body;
use crate::presentation::models::{
    ContainerCheckResponse, ErrorResponse, HealthResponse, ImageCheckResponse,
    MonitoringStartedResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::check_image,
        crate::presentation::controllers::check_container,
        crate::presentation::controllers::start_monitoring,
        crate::presentation::controllers::stop_monitoring,
        crate::presentation::controllers::get_history,
        crate::presentation::controllers::health_check,
    ),
    components(
        schemas(
            ImageCheckResponse,
            ContainerCheckResponse,
            MonitoringStartedResponse,
            ErrorResponse,
            HealthResponse,
            ScanRecord,
            ScanId,
            ScanStatus,
            RuntimeAnalysis
        )
    ),
    tags(
        (name = "check", description = "Static analysis admission for images and containers"),
        (name = "monitor", description = "Runtime behaviour monitoring sessions"),
        (name = "history", description = "Scan history lookups"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Dockwatch API",
        version = "0.1.0",
        description = "Admission control for docker image and container analyses, and runtime monitoring sessions."
    )
)]
pub struct ApiDoc;

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    let headers = [
        axum::http::header::CONTENT_TYPE,
        axum::http::header::ACCEPT,
        axum::http::header::USER_AGENT,
        axum::http::header::ORIGIN,
    ];

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        tracing::debug!("CORS: Allowing any origin");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600));
    }

    let origins: Vec<axum::http::HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            axum::http::HeaderValue::from_str(origin)
                .map_err(|_| {
                    tracing::warn!(origin, "Invalid CORS origin in config; skipping");
                })
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(3600))
}

/// Create the application router
pub fn create_router(state: OrchestratorState, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/v1/check/images/", post(check_image_without_name))
        .route("/v1/check/images/{*image_name}", post(check_image))
        .route("/v1/check/containers/", post(check_container_without_id))
        .route("/v1/check/containers/{container_id}", post(check_container))
        .route(
            "/v1/monitor/containers/{container_id}/start",
            post(start_monitoring),
        )
        .route(
            "/v1/monitor/containers/{container_id}/stop",
            post(stop_monitoring),
        )
        .route("/v1/history/{*image_name}", get(get_history))
        .route("/health", get(health_check));

    let mut router = api_routes;
    if config.enable_docs {
        router = router.route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    router = router.fallback(route_not_found);

    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(middleware::map_response(ensure_error_body))
        .layer(cors_layer(config))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ));

    router.layer(service_builder).with_state(state)
}
