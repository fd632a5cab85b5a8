use anyhow::{Context, Result};
use clap::Parser;
use fieldflash::backup::FieldLayout;
use fieldflash::cli::RemoteArgs;
use fieldflash::config::FieldConfig;
use fieldflash::pipeline::FieldFlash;
use fieldflash::signal::InterruptWatcher;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn default_tool_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating this executable")?;
    exe.parent()
        .map(|dir| dir.to_path_buf())
        .context("executable has no parent directory")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = RemoteArgs::parse();
    let mut config = FieldConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    config.validate()?;

    let tool_dir = match &args.tool_dir {
        Some(dir) => dir.clone(),
        None => default_tool_dir()?,
    };

    let job = FieldFlash {
        layout: FieldLayout::new(tool_dir),
        config,
        selector: args.selector(),
    };

    let watcher = InterruptWatcher::spawn();
    let mut interrupt = watcher.interrupt();
    let mut sink = |line: &str| println!("{line}");

    let report = job.run(&mut sink, &mut interrupt).await?;

    let session = report.session.into_result()?;
    info!("[{}] Flashed {:?}", session.id, session.artifact);
    Ok(())
}
