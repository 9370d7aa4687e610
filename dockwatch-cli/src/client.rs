//! HTTP client for the dockwatch server

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::exit_codes;

/// Error raised when a request never produced an HTTP response
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Could not reach dockwatch server at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Connection { .. } => exit_codes::NETWORK_ERROR,
            ClientError::Request { .. } => exit_codes::INTERNAL_ERROR,
        }
    }
}

/// A response from the server, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: StatusCode,
    /// Parsed JSON body, or the raw text wrapped in a string when it is not JSON
    pub body: Value,
}

impl ApiReply {
    pub fn exit_code(&self) -> i32 {
        if self.status.is_success() {
            exit_codes::SUCCESS
        } else if self.status.is_client_error() {
            exit_codes::CLIENT_ERROR
        } else {
            exit_codes::INTERNAL_ERROR
        }
    }
}

/// Which end of a monitoring session to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    Start,
    Stop,
}

impl MonitorAction {
    fn as_path(self) -> &'static str {
        match self {
            MonitorAction::Start => "start",
            MonitorAction::Stop => "stop",
        }
    }
}

pub struct DockwatchClient {
    client: Client,
    base_url: String,
}

impl DockwatchClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client with custom timeout, using default client");
                Client::new()
            });

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a vulnerability scan of an image
    pub async fn check_image(&self, image_name: &str) -> Result<ApiReply, ClientError> {
        self.send(Method::POST, &format!("/v1/check/images/{image_name}"), None)
            .await
    }

    /// Request a scan of the image behind a running container
    pub async fn check_container(&self, container_id: &str) -> Result<ApiReply, ClientError> {
        self.send(
            Method::POST,
            &format!("/v1/check/containers/{container_id}"),
            None,
        )
        .await
    }

    pub async fn monitor(
        &self,
        container_id: &str,
        action: MonitorAction,
    ) -> Result<ApiReply, ClientError> {
        self.send(
            Method::POST,
            &format!(
                "/v1/monitor/containers/{container_id}/{}",
                action.as_path()
            ),
            None,
        )
        .await
    }

    /// List recorded scans of an image, optionally narrowed to one scan id
    pub async fn history(
        &self,
        image_name: &str,
        scan_id: Option<&str>,
    ) -> Result<ApiReply, ClientError> {
        self.send(
            Method::GET,
            &format!("/v1/history/{image_name}"),
            scan_id.map(|id| ("id", id)),
        )
        .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<(&str, &str)>,
    ) -> Result<ApiReply, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "Sending request");

        let mut request = self.client.request(method, &url);
        if let Some(query) = query {
            request = request.query(&[query]);
        }

        let response = request.send().await.map_err(|source| {
            if source.is_connect() || source.is_timeout() {
                ClientError::Connection {
                    url: url.clone(),
                    source,
                }
            } else {
                ClientError::Request {
                    url: url.clone(),
                    source,
                }
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| ClientError::Request {
                url: url.clone(),
                source,
            })?;
        debug!(status = status.as_u16(), "Received response");

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiReply { status, body })
    }
}
