use std::process::ExitCode;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;
use tripgate_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

/// Logs go to stderr so stdout carries only the JSON command result.
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.level).or_else(|_| EnvFilter::try_new("info"))?;
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!("failed to initialise logging: {error}"))
}

fn main() -> ExitCode {
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);

    if let Err(error) = init_logging(&logging) {
        eprintln!("{error:#}");
    }

    tripgate_cli::run()
}
