//! Configuration file support for Augur
//!
//! Supports both YAML and TOML configuration files.
//!
//! # Example YAML configuration:
//! ```yaml
//! # Augur configuration file
//!
//! # Server settings
//! server:
//!   host: "0.0.0.0"
//!   port: 8080
//!
//! # Model artifact settings
//! models:
//!   model_dir: /var/lib/augur/models
//!
//! # Job queue settings (NATS)
//! queue:
//!   url: "nats://localhost:4222"
//!   subject_prefix: "augur"
//!
//! # Result store settings (Redis)
//! results:
//!   url: "redis://localhost:6379"
//!   ttl_secs: 86400
//!
//! # Worker settings
//! worker:
//!   concurrency: 4
//!   max_retries: 3
//!
//! # Logging settings
//! log:
//!   level: info
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use augur_runtime::{
    DEFAULT_CONCURRENCY, DEFAULT_KEY_PREFIX, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_URL,
    DEFAULT_RESULT_TTL_SECS, DEFAULT_STORE_URL, DEFAULT_SUBJECT_PREFIX,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Model artifact configuration
    pub models: ModelsConfig,

    /// Job queue configuration
    pub queue: QueueConfig,

    /// Result store configuration
    pub results: ResultsConfig,

    /// Worker configuration
    pub worker: WorkerConfig,

    /// Logging configuration
    pub log: LogConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory scanned for `*.json` model artifacts
    pub model_dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// NATS server URL
    pub url: String,

    /// Subject prefix for job and ping subjects
    pub subject_prefix: String,

    /// Readiness ping timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QUEUE_URL.to_string(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            request_timeout_secs: 5,
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// Redis server URL
    pub url: String,

    /// Key prefix for job records
    pub key_prefix: String,

    /// Record TTL in seconds
    pub ttl_secs: u64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl_secs: DEFAULT_RESULT_TTL_SECS,
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent job consumers per worker process
    pub concurrency: usize,

    /// Retry budget for transient failures
    pub max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                model_dir: PathBuf::from("/var/lib/augur/models"),
            },
            queue: QueueConfig {
                url: "nats://nats:4222".to_string(),
                subject_prefix: "augur".to_string(),
                request_timeout_secs: 5,
            },
            results: ResultsConfig {
                url: "redis://redis:6379".to_string(),
                key_prefix: DEFAULT_KEY_PREFIX.to_string(),
                ttl_secs: DEFAULT_RESULT_TTL_SECS,
            },
            worker: WorkerConfig {
                concurrency: 8,
                max_retries: 3,
            },
            log: LogConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Generate example YAML configuration
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    /// Generate example TOML configuration
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.models.model_dir, PathBuf::from("models"));
        assert_eq!(config.queue.url, DEFAULT_QUEUE_URL);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
server:
  port: 9090
  host: "127.0.0.1"
models:
  model_dir: /srv/models
worker:
  concurrency: 16
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.models.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.worker.concurrency, 16);
        // Untouched sections keep their defaults.
        assert_eq!(config.results.ttl_secs, DEFAULT_RESULT_TTL_SECS);
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
[server]
port = 9090
host = "127.0.0.1"

[queue]
url = "nats://broker:4222"
subject_prefix = "augur.staging"

[worker]
max_retries = 5
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.queue.url, "nats://broker:4222");
        assert_eq!(config.queue.subject_prefix, "augur.staging");
        assert_eq!(config.worker.max_retries, 5);
    }
}
