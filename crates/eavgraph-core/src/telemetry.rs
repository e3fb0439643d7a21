//! Tracing setup for hosts embedding the graph

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber built from `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an
/// error if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("Invalid log filter '{}': {e}", config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
    }
}
