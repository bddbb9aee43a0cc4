//! Configuration loading for drift-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for drift-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Liveness sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Stats emission configuration.
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Defaults to port 443 so relay traffic blends with
    /// ordinary encrypted web traffic at network intermediaries.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted frame size in bytes (default: 1MB).
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Seconds a connection may idle before sending `join` (default: 10).
    /// Connections that don't join within this window are dropped.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

/// Liveness sweep configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Sweep interval in seconds (default: 30).
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    /// Enable the sweep task (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Stats emission configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Stats interval in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
    /// Enable the stats task (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:443".to_string()
}

fn default_max_frame_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_join_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_stats_interval() -> u64 {
    300 // 5 minutes
}

fn default_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            enabled: default_enabled(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval(),
            enabled: default_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:443");
        assert_eq!(config.limits.max_frame_size, 1024 * 1024);
        assert_eq!(config.limits.join_timeout_secs, 10);
        assert_eq!(config.sweep.interval_secs, 30);
        assert_eq!(config.stats.interval_secs, 300);
        assert!(config.sweep.enabled);
        assert!(config.stats.enabled);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:8443"

[limits]
max_frame_size = 2097152
join_timeout_secs = 30

[sweep]
interval_secs = 60

[stats]
enabled = false
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8443");
        assert_eq!(config.limits.max_frame_size, 2097152);
        assert_eq!(config.limits.join_timeout_secs, 30);
        assert_eq!(config.sweep.interval_secs, 60);
        assert!(!config.stats.enabled);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:443");
        assert_eq!(config.sweep.interval_secs, 30);
    }
}
