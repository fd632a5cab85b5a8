use crate::core::{FlashSession, Stage};
use crate::error::{DeployError, Result};
use crate::execution::{is_executable, run_streamed, LineSink};
use crate::signal::Interrupt;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Writes `artifact` to the microcontroller with the external programmer.
///
/// The exit status lands in the returned session as is; callers decide what a
/// non-zero status means (see [`FlashSession::into_result`]).
pub async fn flash(
    artifact: &Path,
    mcu: &str,
    programmer: &Path,
    sink: &mut dyn LineSink,
    interrupt: &mut Interrupt,
) -> Result<FlashSession> {
    check_programmer(programmer)?;
    if !artifact.is_file() {
        return Err(DeployError::not_found("artifact", artifact));
    }

    let mut session = FlashSession::new(artifact, mcu, programmer);
    info!("[{}] Flashing {:?} on {}", session.id, artifact, mcu);

    let mut command = Command::new(programmer);
    command
        .arg(format!("--mcu={mcu}"))
        .arg("-v")
        .arg("-s")
        .arg(artifact);
    let status = run_streamed(command, Stage::Flash, sink, interrupt).await?;

    info!("[{}] Programmer exited with {}", session.id, status);
    session.exit_status = Some(status);
    Ok(session)
}

pub fn check_programmer(programmer: &Path) -> Result<()> {
    if is_executable(programmer) {
        Ok(())
    } else {
        Err(DeployError::not_found("programmer", programmer))
    }
}
