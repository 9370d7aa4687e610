//! Error-to-response mapping

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::ApplicationError;
use crate::presentation::models::{ErrorResponse, SortedJson};

/// Convert application errors to HTTP responses of the form `{"err", "msg"}`
pub fn application_error_to_response(error: ApplicationError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::error!(
            error = %error,
            http_status = %status,
            error_kind = error.kind(),
            "Application error mapped to HTTP response"
        );
    } else {
        tracing::warn!(
            error = %error,
            http_status = %status,
            error_kind = error.kind(),
            "Request rejected"
        );
    }

    SortedJson::new(
        status,
        &ErrorResponse {
            err: status.as_u16(),
            msg: error.message().to_string(),
        },
    )
    .into_response()
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        application_error_to_response(self)
    }
}

/// Give every error response the `{"err", "msg"}` body.
///
/// Errors produced outside the handlers (unmatched method, request timeout,
/// extractor rejections rendered as text) carry no JSON body. Their status
/// and headers are kept and the body is replaced with the canonical reason.
pub async fn ensure_error_body(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if is_json {
        return response;
    }

    tracing::warn!(http_status = %status, "Request rejected before reaching a handler");

    let (mut parts, _) = response.into_parts();
    let (body_parts, body) = SortedJson::new(
        status,
        &ErrorResponse {
            err: status.as_u16(),
            msg: status.canonical_reason().unwrap_or_default().to_string(),
        },
    )
    .into_response()
    .into_parts();

    parts.headers.remove(header::CONTENT_LENGTH);
    if let Some(content_type) = body_parts.headers.get(header::CONTENT_TYPE) {
        parts.headers.insert(header::CONTENT_TYPE, content_type.clone());
    }
    Response::from_parts(parts, body)
}
