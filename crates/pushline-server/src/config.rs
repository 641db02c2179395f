//! Server configuration.
//!
//! Configuration is layered:
//! - built-in defaults
//! - a TOML file (`PUSHLINE_CONFIG`, or the first of the default paths that exists)
//! - environment variables (`PUSHLINE_*`, nested keys separated by `__`)

use anyhow::{bail, Context, Result};
use pushline_core::{HeartbeatConfig as CoreHeartbeatConfig, HubConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Config file locations, in lookup order.
const CONFIG_PATHS: [&str; 3] = [
    "pushline.toml",
    "/etc/pushline/pushline.toml",
    "~/.config/pushline/pushline.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Identity configuration.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes, enforced by the transport and
    /// by envelope decoding.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Probe interval in milliseconds. Two missed probes close the connection.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
}

/// Identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Query parameter carrying the user id on connect.
    #[serde(default = "default_query_param")]
    pub query_param: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3040
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_query_param() -> String {
    "userId".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            identity: IdentityConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            query_param: default_query_param(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment and defaults.
    ///
    /// The file is `PUSHLINE_CONFIG` if set, otherwise the first of the
    /// default paths that exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, an
    /// environment override has the wrong type, or a value is out of range.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PUSHLINE_CONFIG").ok().or_else(|| {
            CONFIG_PATHS
                .iter()
                .map(|path| shellexpand::tilde(path).into_owned())
                .find(|path| Path::new(path).exists())
        });

        Self::layered(path.as_deref().map(Path::new))
    }

    /// Load configuration from a specific file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is
    /// out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::layered(Some(path.as_ref()))
    }

    fn layered(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("PUSHLINE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range setting.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.interval_ms == 0 {
            bail!("heartbeat.interval_ms must be greater than zero");
        }
        if self.transport.max_message_size == 0 {
            bail!("transport.max_message_size must be greater than zero");
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Core settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            heartbeat: CoreHeartbeatConfig {
                interval: Duration::from_millis(self.heartbeat.interval_ms),
            },
            max_frame_size: self.transport.max_message_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3040);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.heartbeat.interval_ms, 30_000);
        assert_eq!(config.identity.query_param, "userId");
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 3040);

        let config = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [heartbeat]
            interval_ms = 5000

            [identity]
            query_param = "uid"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.heartbeat.interval_ms, 5000);
        assert_eq!(config.identity.query_param, "uid");
        assert_eq!(config.transport.max_message_size, 64 * 1024);
    }

    #[test]
    fn test_hub_config() {
        let config: Config = toml::from_str(
            "[heartbeat]\ninterval_ms = 1500\n[transport]\nmax_message_size = 262144",
        )
        .unwrap();
        let hub_config = config.hub_config();
        assert_eq!(hub_config.heartbeat.interval, Duration::from_millis(1500));
        assert_eq!(hub_config.max_frame_size, 256 * 1024);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(Config::from_file("/definitely/not/here/pushline.toml").is_err());
    }

    #[test]
    fn test_zero_heartbeat_interval_is_rejected() {
        let config: Config = toml::from_str("[heartbeat]\ninterval_ms = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat.interval_ms"));

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_explicit_file_gets_env_overrides() {
        let path = std::env::temp_dir().join(format!("pushline-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 9000\n\n[heartbeat]\ninterval_ms = 5000\n").unwrap();

        std::env::set_var("PUSHLINE_HEARTBEAT__INTERVAL_MS", "1500");
        let config = Config::from_file(&path);
        std::env::remove_var("PUSHLINE_HEARTBEAT__INTERVAL_MS");
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.heartbeat.interval_ms, 1500);
    }
}
