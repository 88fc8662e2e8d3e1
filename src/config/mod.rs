//! Configuration management for the OSC console gateway
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::transport::TransportMode;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub units: UnitsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Console connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// IPv4/IPv6 literal or hostname; empty leaves the gateway unconfigured
    #[serde(default)]
    pub host: String,
    pub target_port: u16,
    #[serde(default)]
    pub protocol: TransportMode,
    /// Deliver console replies to the feedback cache
    #[serde(default = "default_true")]
    pub listen: bool,
    /// Local UDP port for replies (ephemeral when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_port: Option<u16>,
    /// Ask the console to resend its state after connecting
    #[serde(default)]
    pub polling: bool,
    /// Reopen TCP sessions the console closed
    #[serde(default)]
    pub reconnect: bool,
}

/// Unit of a time quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
}

/// Units accepted from callers vs. units the console expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UnitsConfig {
    #[serde(default = "default_time_input")]
    pub time_input: TimeUnit,
    #[serde(default = "default_time_wire")]
    pub time_wire: TimeUnit,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            time_input: default_time_input(),
            time_wire: default_time_wire(),
        }
    }
}

impl UnitsConfig {
    /// Convert a time value from input units to wire units
    pub fn convert_time(&self, value: f64) -> f64 {
        match (self.time_input, self.time_wire) {
            (TimeUnit::Milliseconds, TimeUnit::Seconds) => value / 1000.0,
            (TimeUnit::Seconds, TimeUnit::Milliseconds) => value * 1000.0,
            _ => value,
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    ///
    /// An empty host is accepted here; the session controller reports it as a
    /// bad configuration instead of refusing to start.
    pub fn validate(&self) -> Result<()> {
        let conn = &self.connection;

        if conn.target_port == 0 {
            anyhow::bail!("connection.target_port cannot be 0");
        }

        if conn.protocol.is_stream() && conn.feedback_port.is_some() {
            anyhow::bail!(
                "connection.feedback_port only applies to udp (protocol is {})",
                conn.protocol
            );
        }

        if conn.host.trim().contains(char::is_whitespace) {
            anyhow::bail!("connection.host contains whitespace: {:?}", conn.host);
        }

        if self.api.enabled && self.api.port == 0 {
            anyhow::bail!("api.port cannot be 0 when the API is enabled");
        }

        Ok(())
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_api_port() -> u16 { 8126 }
fn default_time_input() -> TimeUnit { TimeUnit::Milliseconds }
fn default_time_wire() -> TimeUnit { TimeUnit::Seconds }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
connection:
  host: "console.local"
  target_port: 8000
"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.connection.protocol, TransportMode::Udp);
        assert!(config.connection.listen);
        assert!(!config.connection.polling);
        assert!(!config.connection.reconnect);
        assert_eq!(config.connection.feedback_port, None);
        assert_eq!(config.units, UnitsConfig::default());
        assert_eq!(config.api.port, 8126);
        assert!(config.api.enabled);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
connection:
  host: "10.0.0.5"
  target_port: 9000
  protocol: tcp-raw
  listen: false
  polling: true
  reconnect: true
units:
  time_input: seconds
  time_wire: seconds
api:
  enabled: false
  port: 0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.connection.protocol, TransportMode::TcpRaw);
        assert!(!config.connection.listen);
        assert!(config.connection.reconnect);
        assert_eq!(config.units.time_input, TimeUnit::Seconds);
        assert!(!config.api.enabled);
    }

    #[test]
    fn test_validation_errors() {
        let zero_port = "connection:\n  host: a\n  target_port: 0\n";
        assert!(AppConfig::from_yaml(zero_port).is_err());

        let tcp_feedback =
            "connection:\n  host: a\n  target_port: 1\n  protocol: tcp\n  feedback_port: 9001\n";
        let err = AppConfig::from_yaml(tcp_feedback).unwrap_err();
        assert!(format!("{:#}", err).contains("feedback_port"));

        let bad_protocol = "connection:\n  host: a\n  target_port: 1\n  protocol: sctp\n";
        assert!(AppConfig::from_yaml(bad_protocol).is_err());

        // Unconfigured host is still a loadable config
        let empty_host = "connection:\n  target_port: 8000\n";
        assert_eq!(AppConfig::from_yaml(empty_host).unwrap().connection.host, "");
    }

    #[test]
    fn test_time_conversion() {
        let units = UnitsConfig::default();
        assert_eq!(units.convert_time(250.0), 0.25);

        let reversed = UnitsConfig {
            time_input: TimeUnit::Seconds,
            time_wire: TimeUnit::Milliseconds,
        };
        assert_eq!(reversed.convert_time(1.5), 1500.0);

        let same = UnitsConfig {
            time_input: TimeUnit::Seconds,
            time_wire: TimeUnit::Seconds,
        };
        assert_eq!(same.convert_time(0.3), 0.3);
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let mut config = AppConfig::from_yaml(MINIMAL)?;
        config.connection.feedback_port = Some(9001);
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }
}
