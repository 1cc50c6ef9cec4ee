//! `tracing-subscriber` setup.

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use lockstep_config::logging::{default_filter, prepare_log_file};
use lockstep_config::LogConfig;

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// level. Logs go to stderr unless a file is configured, so they never
/// mix with the program's own stdout output.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    match &config.file {
        Some(path) => {
            let path = prepare_log_file(path)
                .with_context(|| format!("failed to prepare log file: {}", path.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
