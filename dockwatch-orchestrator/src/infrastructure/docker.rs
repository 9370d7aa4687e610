//! Docker CLI container runtime
//!
//! Resolves images and containers by shelling out to the `docker` client:
//! - `docker image inspect` for presence, metadata and digests
//! - `docker pull` for missing images
//! - `docker container inspect` to map a container to its image

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, error, instrument};

use crate::domain::{ContainerRuntime, RuntimeClientError};

/// Configuration for the docker executable
#[derive(Debug, Clone)]
pub struct DockerCliConfig {
    /// Path to the docker executable (or "docker" if in PATH)
    pub executable: String,
    /// Upper bound for a single command, pulls included
    pub timeout: Duration,
}

impl Default for DockerCliConfig {
    fn default() -> Self {
        Self {
            executable: "docker".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&dockwatch_core::config::DockerConfig> for DockerCliConfig {
    fn from(config: &dockwatch_core::config::DockerConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            timeout: config.command_timeout(),
        }
    }
}

pub struct DockerCliRuntime {
    config: DockerCliConfig,
}

impl DockerCliRuntime {
    pub fn new(config: DockerCliConfig) -> Self {
        Self { config }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, RuntimeClientError> {
        let mut cmd = Command::new(&self.config.executable);
        cmd.args(args).kill_on_drop(true);

        debug!(command = ?cmd, "Executing docker");

        tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| RuntimeClientError::Timeout(self.config.timeout.as_secs()))?
            .map_err(|e| RuntimeClientError::CommandFailed(e.to_string()))
    }

    async fn inspect_image_raw(&self, image_name: &str) -> Result<Value, RuntimeClientError> {
        let output = self.run(&["image", "inspect", image_name]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(if is_missing_object(&stderr) {
                RuntimeClientError::ImageNotFound(image_name.to_string())
            } else {
                RuntimeClientError::CommandFailed(stderr.trim().to_string())
            });
        }
        first_inspect_entry(&output.stdout)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    #[instrument(skip(self))]
    async fn image_exists_locally(&self, image_name: &str) -> Result<bool, RuntimeClientError> {
        let output = self
            .run(&["image", "inspect", "--format", "{{.Id}}", image_name])
            .await?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_object(&stderr) {
            Ok(false)
        } else {
            Err(RuntimeClientError::CommandFailed(stderr.trim().to_string()))
        }
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, name: &str, tag: &str) -> Result<(), RuntimeClientError> {
        let reference = pull_reference(name, tag);
        let output = self.run(&["pull", "--quiet", &reference]).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || stdout.contains("errorDetail") {
            error!(
                reference = %reference,
                exit_code = output.status.code(),
                stderr = %stderr.trim(),
                "docker pull failed"
            );
            return Err(RuntimeClientError::PullFailed {
                reason: stderr.trim().to_string(),
                reference,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn inspect_image(&self, image_name: &str) -> Result<Value, RuntimeClientError> {
        self.inspect_image_raw(image_name).await
    }

    #[instrument(skip(self))]
    async fn image_digest(&self, image_name: &str) -> Result<String, RuntimeClientError> {
        let inspected = self.inspect_image_raw(image_name).await?;
        digest_from_inspect(&inspected).ok_or_else(|| {
            RuntimeClientError::InvalidOutput(format!("no digest reported for {}", image_name))
        })
    }

    #[instrument(skip(self))]
    async fn image_name_for_container(
        &self,
        container_id: &str,
    ) -> Result<String, RuntimeClientError> {
        let output = self
            .run(&[
                "container",
                "inspect",
                "--format",
                "{{.Config.Image}}",
                container_id,
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(if is_missing_object(&stderr) {
                RuntimeClientError::ContainerNotFound(container_id.to_string())
            } else {
                RuntimeClientError::CommandFailed(stderr.trim().to_string())
            });
        }

        let image_name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if image_name.is_empty() {
            return Err(RuntimeClientError::InvalidOutput(format!(
                "container {} reports no image",
                container_id
            )));
        }
        Ok(image_name)
    }
}

/// `name:tag`, or `name@digest` when the tag is a pinned digest
fn pull_reference(name: &str, tag: &str) -> String {
    if tag.starts_with("sha256:") {
        format!("{}@{}", name, tag)
    } else {
        format!("{}:{}", name, tag)
    }
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("No such image")
        || stderr.contains("No such container")
        || stderr.contains("No such object")
}

fn first_inspect_entry(stdout: &[u8]) -> Result<Value, RuntimeClientError> {
    let parsed: Value = serde_json::from_slice(stdout)
        .map_err(|e| RuntimeClientError::InvalidOutput(e.to_string()))?;
    match parsed {
        Value::Array(mut entries) if !entries.is_empty() => Ok(entries.swap_remove(0)),
        _ => Err(RuntimeClientError::InvalidOutput(
            "empty inspect result".to_string(),
        )),
    }
}

/// Registry digest of the image, falling back to the local image id for
/// images that were never pushed or pulled.
fn digest_from_inspect(inspected: &Value) -> Option<String> {
    let repo_digest = inspected
        .get("RepoDigests")
        .and_then(Value::as_array)
        .and_then(|digests| digests.first())
        .and_then(Value::as_str)
        .and_then(|entry| entry.split_once('@'))
        .map(|(_, digest)| digest.to_string());

    repo_digest.or_else(|| {
        inspected
            .get("Id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    })
}
