//! Configuration validation module

use crate::config::{
    DockerConfig, HistoryBackend, HistoryConfig, LoggingConfig, QueueBackend, QueueConfig,
    ServerConfig,
};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },

    #[error("Docker configuration error: {message}")]
    Docker { message: String },

    #[error("History configuration error: {message}")]
    History { message: String },

    #[error("Queue configuration error: {message}")]
    Queue { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn docker(message: impl Into<String>) -> Self {
        Self::Docker {
            message: message.into(),
        }
    }

    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // u16 cannot exceed 65535, so only 0 needs checking
        if self.port == 0 {
            return Err(ValidationError::server(format!(
                "Port must be in range 1-65535, got {}",
                self.port
            )));
        }

        if self.host.is_empty() {
            return Err(ValidationError::server("Host cannot be empty"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::server(
                "Request timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ValidationError::logging(format!(
                "Unknown log format '{}', expected 'json' or 'pretty'",
                other
            ))),
        }
    }
}

impl Validate for DockerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.executable.trim().is_empty() {
            return Err(ValidationError::docker("Docker executable cannot be empty"));
        }

        if self.command_timeout_seconds == 0 {
            return Err(ValidationError::docker(
                "Command timeout must be greater than 0",
            ));
        }

        if self.default_tag.is_empty() || self.default_tag.contains(':') {
            return Err(ValidationError::docker(format!(
                "Invalid default tag '{}'",
                self.default_tag
            )));
        }

        Ok(())
    }
}

impl Validate for HistoryConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == HistoryBackend::Postgres {
            if !self.database_url.starts_with("postgres://")
                && !self.database_url.starts_with("postgresql://")
            {
                return Err(ValidationError::history(
                    "Database URL must start with postgres:// or postgresql://",
                ));
            }

            if self.max_connections == 0 {
                return Err(ValidationError::history(
                    "Max connections must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}

impl Validate for QueueConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::queue("Capacity must be greater than 0"));
        }

        if self.enqueue_timeout_seconds == 0 {
            return Err(ValidationError::queue(
                "Enqueue timeout must be greater than 0",
            ));
        }

        if self.backend == QueueBackend::Dragonfly {
            if self.queue_key.is_empty() {
                return Err(ValidationError::queue("Queue key cannot be empty"));
            }
            if !self.dragonfly_url.starts_with("redis://")
                && !self.dragonfly_url.starts_with("rediss://")
            {
                return Err(ValidationError::queue(
                    "Dragonfly URL must start with redis:// or rediss://",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_server_rejects_zero_port() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Server { .. })
        ));
    }

    #[rstest]
    #[case("json", true)]
    #[case("pretty", true)]
    #[case("yaml", false)]
    fn test_logging_format(#[case] format: &str, #[case] valid: bool) {
        let config = LoggingConfig {
            format: format.to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[rstest]
    #[case("latest", true)]
    #[case("", false)]
    #[case("1.0:bad", false)]
    fn test_docker_default_tag(#[case] tag: &str, #[case] valid: bool) {
        let config = DockerConfig {
            default_tag: tag.to_string(),
            ..DockerConfig::default()
        };
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test]
    fn test_postgres_backend_requires_postgres_url() {
        let config = HistoryConfig {
            backend: HistoryBackend::Postgres,
            database_url: "mysql://localhost/db".to_string(),
            ..HistoryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::History { .. })
        ));
    }

    #[test]
    fn test_memory_backend_ignores_database_url() {
        let config = HistoryConfig {
            backend: HistoryBackend::Memory,
            database_url: String::new(),
            ..HistoryConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dragonfly_queue_requires_redis_url() {
        let config = QueueConfig {
            backend: QueueBackend::Dragonfly,
            dragonfly_url: "http://localhost:6379".to_string(),
            ..QueueConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Queue { .. })));
    }

    #[test]
    fn test_queue_rejects_zero_enqueue_timeout() {
        let config = QueueConfig {
            enqueue_timeout_seconds: 0,
            ..QueueConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Queue { .. })));
    }
}
