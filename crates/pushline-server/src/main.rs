//! # Pushline Server
//!
//! Real-time push server delivering messages and notifications to the
//! connections of a user.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! pushline
//!
//! # Run with custom config
//! pushline --config /path/to/pushline.toml
//!
//! # Run with environment variables
//! PUSHLINE_PORT=8080 PUSHLINE_HOST=0.0.0.0 pushline
//! PUSHLINE_HEARTBEAT__INTERVAL_MS=10000 pushline
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pushline push server.
#[derive(Parser, Debug)]
#[command(name = "pushline", version, about = "Real-time push server")]
struct Cli {
    /// Config file to load instead of `PUSHLINE_CONFIG` or the default
    /// locations. `PUSHLINE_*` environment variables still override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "pushline=info,pushline_core=info,pushline_transport=info,tower_http=info".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match &cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting Pushline server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pushline"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_config_path() {
        let cli = Cli::try_parse_from(["pushline", "--config", "/etc/pushline/alt.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/pushline/alt.toml")));
    }

    #[test]
    fn test_cli_config_requires_value() {
        assert!(Cli::try_parse_from(["pushline", "--config"]).is_err());
    }
}
