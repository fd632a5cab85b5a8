use crate::core::{BuildConfiguration, Stage};
use crate::error::{DeployError, Result};
use crate::execution::{check_status, resolve_executable, run_streamed, LineSink};
use crate::signal::Interrupt;
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// Log levels the toolchain prefixes its chatter with.
const NOISE_MARKERS: [&str; 3] = ["TRACE", "DEBUG", "INFO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Suppress,
    Forward,
}

pub fn classify_toolchain_line(line: &str) -> LineClass {
    match line.split_whitespace().next() {
        Some(first) if NOISE_MARKERS.contains(&first) => LineClass::Suppress,
        _ => LineClass::Forward,
    }
}

/// Compiles the project and returns the artifact path.
pub async fn build(
    config: &BuildConfiguration,
    sink: &mut dyn LineSink,
    interrupt: &mut Interrupt,
) -> Result<PathBuf> {
    let start_time = Instant::now();

    let toolchain = resolve_executable(&config.toolchain)?;
    let project = config.project_path();
    if !project.is_file() {
        return Err(DeployError::not_found("project file", project));
    }

    let build_dir = config.build_path();
    prepare_build_dir(&build_dir, config.clean).await?;

    let mut command = Command::new(&toolchain);
    command
        .arg("--verify")
        .arg("--board")
        .arg(config.board_spec())
        .arg("--pref")
        .arg(format!("build.path={}", build_dir.display()));
    if config.verbose {
        command.arg("-v");
    }
    command.arg(&project);

    info!("Building {:?} for {}", project, config.board);
    let mut filtered = |line: &str| {
        if classify_toolchain_line(line) == LineClass::Forward {
            sink.emit(line);
        }
    };
    let status = run_streamed(command, Stage::Build, &mut filtered, interrupt).await?;
    check_status(Stage::Build, status)?;

    let artifact = config.artifact_path();
    info!(
        "Build finished in {} ms: {:?}",
        start_time.elapsed().as_millis(),
        artifact
    );
    Ok(artifact)
}

async fn prepare_build_dir(build_dir: &std::path::Path, clean: bool) -> Result<()> {
    if !build_dir.is_dir() {
        debug!("Creating build directory {:?}", build_dir);
        fs::create_dir_all(build_dir).await?;
    } else if clean {
        debug!("Cleaning build directory {:?}", build_dir);
        let _ = fs::remove_dir_all(build_dir).await;
        fs::create_dir_all(build_dir).await?;
    }
    Ok(())
}

/// The artifact left by an earlier build, for flash-only runs.
pub fn find_built_artifact(config: &BuildConfiguration) -> Result<PathBuf> {
    let artifact = config.artifact_path();
    if artifact.is_file() {
        Ok(artifact)
    } else {
        Err(DeployError::not_found("artifact", artifact))
    }
}
