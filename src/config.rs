//! Configuration management for Bruteguard.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BruteguardError, Result};
use crate::ratelimit::{Algorithm, Limits, RateLimiterConfig};

/// Prefix of environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "BRUTEGUARD";

/// Main configuration for the Bruteguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BruteguardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Access list storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50051))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// Attempts per interval for a single login
    #[serde(default = "default_limit_login")]
    pub limit_login: u64,

    /// Attempts per interval for a single password
    #[serde(default = "default_limit_password")]
    pub limit_password: u64,

    /// Attempts per interval for a single IP
    #[serde(default = "default_limit_ip")]
    pub limit_ip: u64,

    /// Window / refill interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Idle time before a bucket is evicted, in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Idle ticks before a leaky counter bucket is evicted (0 = never)
    #[serde(default = "default_max_idle_ticks")]
    pub max_idle_ticks: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            limit_login: default_limit_login(),
            limit_password: default_limit_password(),
            limit_ip: default_limit_ip(),
            interval_ms: default_interval_ms(),
            ttl_ms: default_ttl_ms(),
            max_idle_ticks: default_max_idle_ticks(),
        }
    }
}

fn default_algorithm() -> Algorithm {
    Algorithm::LeakyCounter
}

fn default_limit_login() -> u64 {
    10
}

fn default_limit_password() -> u64 {
    100
}

fn default_limit_ip() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_ttl_ms() -> u64 {
    600_000
}

fn default_max_idle_ticks() -> u64 {
    10
}

impl RateLimitingConfig {
    /// Build the rate limiter configuration.
    pub fn to_limiter_config(&self) -> Result<RateLimiterConfig> {
        if self.interval_ms == 0 {
            return Err(BruteguardError::Config(
                "rate_limiting.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(RateLimiterConfig {
            algorithm: self.algorithm,
            limits: Limits {
                ip: self.limit_ip,
                password: self.limit_password,
                login: self.limit_login,
            },
            interval: Duration::from_millis(self.interval_ms),
            ttl: Duration::from_millis(self.ttl_ms),
            max_idle_ticks: self.max_idle_ticks,
        })
    }
}

/// Where the access lists are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// SQLite database file
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("bruteguard.db")
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BruteguardConfig {
    /// Load configuration from an optional file, then `BRUTEGUARD_*`
    /// environment variables.
    ///
    /// Nested keys use `__` as separator, e.g.
    /// `BRUTEGUARD_RATE_LIMITING__LIMIT_IP=5`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| BruteguardError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BruteguardError::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BruteguardConfig::default();
        assert_eq!(config.server.grpc_addr.port(), 50051);
        assert_eq!(config.rate_limiting.algorithm, Algorithm::LeakyCounter);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);

        let limiter = config.rate_limiting.to_limiter_config().unwrap();
        assert_eq!(limiter.limits.login, 10);
        assert_eq!(limiter.limits.password, 100);
        assert_eq!(limiter.limits.ip, 1000);
        assert_eq!(limiter.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  grpc_addr: "0.0.0.0:6000"
rate_limiting:
  algorithm: token_bucket
  limit_login: 5
  interval_ms: 1000
storage:
  backend: memory
logging:
  json: true
"#;
        let config = BruteguardConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.grpc_addr.port(), 6000);
        assert_eq!(config.rate_limiting.algorithm, Algorithm::TokenBucket);
        assert_eq!(config.rate_limiting.limit_login, 5);
        assert_eq!(config.rate_limiting.limit_ip, 1000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let yaml = "rate_limiting:\n  algorithm: sliding_log\n";
        assert!(matches!(
            BruteguardConfig::from_yaml(yaml),
            Err(BruteguardError::Config(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = RateLimitingConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(config.to_limiter_config().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("bruteguard-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "rate_limiting:\n  algorithm: fixed_window\n  limit_password: 7\n",
        )
        .unwrap();

        let config = BruteguardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.rate_limiting.algorithm, Algorithm::FixedWindow);
        assert_eq!(config.rate_limiting.limit_password, 7);
        assert_eq!(config.rate_limiting.limit_login, 10);

        let _ = std::fs::remove_file(&path);
    }
}
