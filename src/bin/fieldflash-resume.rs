use anyhow::{Context, Result};
use clap::Parser;
use fieldflash::cli::ResumeArgs;
use fieldflash::config::FieldConfig;
use fieldflash::pause::ResumeTrigger;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let _ = ResumeArgs::parse();
    let config = FieldConfig::load(None).context("loading configuration")?;

    // Undelivered tokens are not an error: there may be no daemon to resume.
    ResumeTrigger::from_config(&config).send().await;
    Ok(())
}
