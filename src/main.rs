use anyhow::{Context, Result};
use clap::Parser;
use fieldflash::cli::DeployArgs;
use fieldflash::config::DeployConfig;
use fieldflash::pipeline::DeployPipeline;
use fieldflash::signal::InterruptWatcher;
use fieldflash::ArduinoBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = DeployArgs::parse();
    let mut config = DeployConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &args.project_dir {
        config.build.project_dir = dir.clone();
    }
    config.build.clean |= args.clean;
    config.build.verbose |= args.verbose;

    let watcher = InterruptWatcher::spawn();
    let mut interrupt = watcher.interrupt();
    let mut sink = |line: &str| println!("{line}");

    let builder = ArduinoBuilder::new();
    let report = DeployPipeline::new(&config, &builder)
        .run(args.mode(), &mut sink, &mut interrupt)
        .await?;

    info!(
        "Done in {} ms: {:?} (uploaded: {}, flashed: {})",
        report.duration_ms, report.artifact, report.uploaded, report.remote_flashed
    );
    Ok(())
}
