use crate::core::{RemoteTarget, Stage};
use crate::error::{DeployError, Result};
use crate::execution::{check_status, resolve_executable, run_streamed, LineSink};
use crate::signal::Interrupt;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Copies the artifact into the target's remote directory, keeping its name.
pub async fn upload(
    artifact: &Path,
    target: &RemoteTarget,
    sink: &mut dyn LineSink,
    interrupt: &mut Interrupt,
) -> Result<()> {
    target.validate()?;
    if !artifact.is_file() {
        return Err(DeployError::not_found("artifact", artifact));
    }
    let scp = resolve_executable(&target.scp_program)?;

    let destination = target.copy_destination();
    info!("Uploading {:?} to {}", artifact, destination);

    let mut command = Command::new(scp);
    command.arg(artifact).arg(&destination);
    let status = run_streamed(command, Stage::Upload, sink, interrupt).await?;
    check_status(Stage::Upload, status)
}

/// Runs the field host's flashing entry point over ssh.
pub async fn invoke_remote_flash(
    target: &RemoteTarget,
    sink: &mut dyn LineSink,
    interrupt: &mut Interrupt,
) -> Result<()> {
    target.validate()?;
    let ssh = resolve_executable(&target.ssh_program)?;

    let remote_command = format!("'{}'", target.entry_point_path());
    info!("Flashing on {} via {}", target.address, remote_command);

    let mut command = Command::new(ssh);
    command.arg(&target.address).arg(&remote_command);
    let status = run_streamed(command, Stage::RemoteFlash, sink, interrupt).await?;
    check_status(Stage::RemoteFlash, status)
}
