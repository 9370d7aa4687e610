//! Integration tests for the HTTP surface

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use common::Harness;
use dockwatch_core::config::ServerConfig;
use dockwatch_orchestrator::application::errors::{
    ANALYSIS_UNAVAILABLE, BAD_CONTAINER_ID, BAD_IMAGE_NAME, BAD_SCAN_ID,
};
use dockwatch_orchestrator::create_router;

fn server(harness: &Harness) -> TestServer {
    let router = create_router(harness.state(), &ServerConfig::default());
    TestServer::new(router).expect("test server should start")
}

#[tokio::test]
async fn test_check_image_accepts_and_renders_sorted_keys() {
    let harness = Harness::new(false);
    harness.runtime.add_local_image("redis", "sha256:aaa").await;
    let server = server(&harness);

    let response = server.post("/v1/check/images/redis").await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["msg"], "Accepted the analysis of <redis>");
    assert_eq!(body["image_digest"], "sha256:aaa");
    assert!(body.get("history").is_none());

    let text = response.text();
    let keys = ["\"id\"", "\"image_digest\"", "\"metadata\"", "\"msg\""];
    let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "keys not sorted: {text}");
}

#[tokio::test]
async fn test_check_image_with_repository_path() {
    let harness = Harness::new(false);
    harness
        .runtime
        .add_local_image("library/nginx:1.27", "sha256:ccc")
        .await;
    let server = server(&harness);

    let response = server.post("/v1/check/images/library/nginx:1.27").await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    assert_eq!(
        response.json::<Value>()["msg"],
        "Accepted the analysis of <library/nginx:1.27>"
    );
}

#[tokio::test]
async fn test_repeated_image_check_returns_history() {
    let harness = Harness::new(false);
    harness.runtime.add_local_image("redis", "sha256:aaa").await;
    let server = server(&harness);

    let first: Value = server.post("/v1/check/images/redis").await.json();
    let second = server.post("/v1/check/images/redis").await;

    assert_eq!(second.status_code(), StatusCode::ACCEPTED);
    let body: Value = second.json();
    assert_eq!(body["id"], first["id"]);
    assert_eq!(body["history"][0]["status"], "Analyzing");
    assert_eq!(body["history"][0]["id"], first["id"]);
}

#[tokio::test]
async fn test_empty_image_name_is_bad_request() {
    let harness = Harness::new(false);
    let server = server(&harness);

    let response = server.post("/v1/check/images/").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), r#"{"err":400,"msg":"Bad image name"}"#);
}

#[tokio::test]
async fn test_unknown_image_is_not_found() {
    let harness = Harness::new(false);
    let server = server(&harness);

    let response = server.post("/v1/check/images/nope").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.text(), r#"{"err":404,"msg":"Image name not found"}"#);
}

#[tokio::test]
async fn test_check_container() {
    let harness = Harness::new(false);
    harness.runtime.add_container("3f2a9c", "redis:7").await;
    let server = server(&harness);

    let response = server.post("/v1/check/containers/3f2a9c").await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    assert_eq!(
        response.json::<Value>()["msg"],
        "Accepted the analysis of <redis:7> with id: 3f2a9c"
    );

    let missing = server.post("/v1/check/containers/missing").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(missing.text(), r#"{"err":404,"msg":"Container Id not found"}"#);

    let empty = server.post("/v1/check/containers/").await;
    assert_eq!(empty.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.text(), r#"{"err":400,"msg":"Bad container id"}"#);
}

#[tokio::test]
async fn test_monitoring_disabled_is_unavailable() {
    let harness = Harness::new(false);
    harness.runtime.add_container("3f2a9c", "redis:7").await;
    let server = server(&harness);

    for action in ["start", "stop"] {
        let response = server
            .post(&format!("/v1/monitor/containers/3f2a9c/{action}"))
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.text(),
            r#"{"err":503,"msg":"Behaviour analysis service unavailable"}"#
        );
    }
}

#[tokio::test]
async fn test_monitoring_session_lifecycle() {
    let harness = Harness::new(true);
    harness.runtime.add_container("3f2a9c", "redis:7").await;
    let server = server(&harness);

    let started = server.post("/v1/monitor/containers/3f2a9c/start").await;
    assert_eq!(started.status_code(), StatusCode::ACCEPTED);
    let started: Value = started.json();
    assert_eq!(started["image_name"], "redis:7");
    assert_eq!(
        started["msg"],
        "Monitoring of docker container with id <3f2a9c> started"
    );

    let again = server.post("/v1/monitor/containers/3f2a9c/start").await;
    assert_eq!(again.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        again.json::<Value>(),
        json!({"err": 400, "msg": "The monitoring for the requested container id is already started"})
    );

    let stopped = server.post("/v1/monitor/containers/3f2a9c/stop").await;
    assert_eq!(stopped.status_code(), StatusCode::OK);
    let stopped: Value = stopped.json();
    assert_eq!(stopped["id"], started["id"]);
    assert_eq!(stopped["status"], "Completed");
    assert_eq!(stopped["image_name"], "redis:7");
    assert!(stopped["runtime_analysis"]["stop_timestamp"].is_f64());

    let twice = server.post("/v1/monitor/containers/3f2a9c/stop").await;
    assert_eq!(twice.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        twice.json::<Value>()["msg"],
        "There is not monitoring for the requested container id"
    );
}

#[tokio::test]
async fn test_history_endpoint() {
    let harness = Harness::new(false);
    harness.runtime.add_local_image("redis", "sha256:aaa").await;
    let server = server(&harness);

    let accepted: Value = server.post("/v1/check/images/redis").await.json();

    let all = server.get("/v1/history/redis").await;
    assert_eq!(all.status_code(), StatusCode::OK);
    let all: Value = all.json();
    assert_eq!(all.as_array().map(Vec::len), Some(1));
    assert_eq!(all[0]["id"], accepted["id"]);

    let id = accepted["id"].as_str().unwrap();
    let one = server
        .get("/v1/history/redis")
        .add_query_param("id", id)
        .await;
    assert_eq!(one.status_code(), StatusCode::OK);

    let missing = server.get("/v1/history/nginx").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(missing.text(), r#"{"err":404,"msg":"History not found"}"#);

    let bad_id = server
        .get("/v1/history/redis")
        .add_query_param("id", "not-a-uuid")
        .await;
    assert_eq!(bad_id.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_openapi() {
    let harness = Harness::new(true);
    let server = server(&harness);

    let health = server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    let health: Value = health.json();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["runtime_analysis_enabled"], true);

    let docs = server.get("/api-docs/openapi.json").await;
    assert_eq!(docs.status_code(), StatusCode::OK);
    let docs: Value = docs.json();
    assert!(docs["paths"].get("/v1/check/images/{image_name}").is_some());
    assert!(
        docs["paths"]
            .get("/v1/monitor/containers/{container_id}/stop")
            .is_some()
    );
}

#[tokio::test]
async fn test_docs_can_be_disabled() {
    let harness = Harness::new(false);
    let config = ServerConfig {
        enable_docs: false,
        ..ServerConfig::default()
    };
    let server = TestServer::new(create_router(harness.state(), &config)).unwrap();

    let docs = server.get("/api-docs/openapi.json").await;
    assert_eq!(docs.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        docs.json::<Value>(),
        json!({"err": 404, "msg": "Not Found"})
    );
}

// ── Malformed requests ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_undecodable_path_is_rejected_with_error_body() {
    let harness = Harness::new(true);
    let server = server(&harness);

    let cases = [
        ("/v1/check/images/%FF", BAD_IMAGE_NAME),
        ("/v1/check/containers/%FF", BAD_CONTAINER_ID),
        ("/v1/monitor/containers/%FF/start", BAD_CONTAINER_ID),
        ("/v1/monitor/containers/%FF/stop", BAD_CONTAINER_ID),
    ];
    for (path, msg) in cases {
        let response = server.post(path).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(response.json::<Value>(), json!({"err": 400, "msg": msg}), "{path}");
    }

    let history = server.get("/v1/history/%FF").await;
    assert_eq!(history.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        history.json::<Value>(),
        json!({"err": 400, "msg": BAD_IMAGE_NAME})
    );

    assert!(harness.runtime.calls().await.is_empty());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_disabled_monitoring_is_unavailable_for_any_container_id() {
    let harness = Harness::new(false);
    let server = server(&harness);

    for path in [
        "/v1/monitor/containers/%FF/start",
        "/v1/monitor/containers/%FF/stop",
        "/v1/monitor/containers/%20/start",
    ] {
        let response = server.post(path).await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE, "{path}");
        assert_eq!(
            response.json::<Value>(),
            json!({"err": 503, "msg": ANALYSIS_UNAVAILABLE}),
            "{path}"
        );
    }
}

#[tokio::test]
async fn test_undecodable_history_query_is_bad_scan_id() {
    let harness = Harness::new(false);
    let server = server(&harness);

    let response = server.get("/v1/history/redis?id=%FF").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>(),
        json!({"err": 400, "msg": BAD_SCAN_ID})
    );
}

#[tokio::test]
async fn test_wrong_method_and_unknown_route_render_error_body() {
    let harness = Harness::new(false);
    let server = server(&harness);

    let wrong_method = server.get("/v1/check/images/redis").await;
    assert_eq!(wrong_method.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        wrong_method.json::<Value>(),
        json!({"err": 405, "msg": "Method Not Allowed"})
    );

    let unknown = server.post("/v1/scan/redis").await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        unknown.json::<Value>(),
        json!({"err": 404, "msg": "Not Found"})
    );
}

#[tokio::test]
async fn test_request_timeout_renders_error_body() {
    let harness = Harness::new(false);
    harness.runtime.add_local_image("redis", "sha256:aaa").await;
    harness.queue.set_stalled(true);
    let config = ServerConfig {
        request_timeout_seconds: 1,
        ..ServerConfig::default()
    };
    let server = TestServer::new(create_router(harness.state(), &config)).unwrap();

    let response = server.post("/v1/check/images/redis").await;

    assert_eq!(response.status_code(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
        response.json::<Value>(),
        json!({"err": 408, "msg": "Request Timeout"})
    );
}
