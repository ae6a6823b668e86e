use amele_config::{LogFormat, LoggingConfig};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level.to_string());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // Use try_init to avoid panic if global subscriber already set
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let env_filter = build_filter(log_level);

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
