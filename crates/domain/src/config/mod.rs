mod observability;
mod server;
mod store;
mod streaming;

pub use observability::*;
pub use server::*;
pub use store::*;
pub use streaming::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit".into(),
                    message: "requests_per_second and burst_size must be > 0".into(),
                });
            }
        }

        // Sampling interval 0 would make `count % N` undefined.
        if self.streaming.metrics_sample_interval == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "streaming.metrics_sample_interval".into(),
                message: "sample interval must be at least 1".into(),
            });
        }

        if self.streaming.outbound_buffer == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "streaming.outbound_buffer".into(),
                message: "outbound buffer must be at least 1".into(),
            });
        }

        if self.streaming.persist_queue == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "streaming.persist_queue".into(),
                message: "persist queue must be at least 1".into(),
            });
        }

        if self.streaming.idle_timeout_secs == Some(0) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "streaming.idle_timeout_secs".into(),
                message: "idle timeout must be at least 1 second (omit to disable)".into(),
            });
        }

        if self.store.backend == StoreBackend::Memory {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "store.backend".into(),
                message: "in-memory store: session and metrics records are lost on restart".into(),
            });
        }

        if self.store.backend == StoreBackend::Jsonl && self.store.path.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.path".into(),
                message: "jsonl backend requires a non-empty path".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}
