//! Minimal worker: merges its inputs into the carried context and reports it back.

use amele_config::ConfigLoader;
use amele_logging::init_logging_from_config;
use amele_worker::Client;
use anyhow::{Context, Result};
use log::info;

fn main() -> Result<()> {
    let config = ConfigLoader::new()
        .from_env()
        .context("Failed to load worker configuration")?;
    init_logging_from_config(&config.logging)?;

    let mut client = Client::new(config);
    let inputs = client.accept().context("Failed to receive envelope")?;
    info!("Echoing {} input fields", inputs.len());

    let mut context = client.context().clone();
    context.extend(inputs);

    client
        .respond(context)
        .context("Failed to deliver final context")?;
    Ok(())
}
