use crate::core::Stage;
use crate::error::{DeployError, Result};
use crate::signal::Interrupt;
use command_group::AsyncCommandGroup;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long an interrupted process group gets between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Receives child process output, one line at a time, without terminator.
pub trait LineSink: Send {
    fn emit(&mut self, line: &str);
}

impl<F> LineSink for F
where
    F: FnMut(&str) + Send,
{
    fn emit(&mut self, line: &str) {
        self(line)
    }
}

/// Runs `command` to completion, forwarding its stdout and stderr to `sink`
/// in the order the child wrote them.
///
/// Both streams share the write end of a single pipe, so interleaving is
/// decided by the kernel rather than by two competing readers. The child
/// leads its own process group. If `interrupt` fires, the group gets SIGTERM,
/// then SIGKILL after a grace period or a second interrupt. Output
/// written while the group shuts down still reaches the sink before
/// `Cancelled` is returned.
pub async fn run_streamed(
    mut command: Command,
    stage: Stage,
    sink: &mut dyn LineSink,
    interrupt: &mut Interrupt,
) -> Result<ExitStatus> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let (output, writer) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(std::io::Error::from)?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer.try_clone()?))
        .stderr(Stdio::from(writer))
        .kill_on_drop(true);

    debug!("Spawning {:?}", command.as_std());
    let spawned = command.group_spawn();
    // The command holds our copies of the write end; EOF needs them closed.
    drop(command);
    let mut child = spawned.map_err(|source| DeployError::Spawn {
        program: program.clone(),
        source,
    })?;
    let group = child.inner().id().map(|pid| Pid::from_raw(-(pid as i32)));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reader = tokio::task::spawn_blocking(move || forward_lines(File::from(output), tx));

    let escalation = tokio::time::sleep(TERMINATE_GRACE);
    tokio::pin!(escalation);
    let mut interrupted = false;
    let mut killed = false;
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => sink.emit(&line),
                None => break,
            },
            _ = interrupt.triggered(), if !interrupted => {
                interrupted = true;
                warn!("Terminating {} ({})", program, stage);
                signal_group(group, Signal::SIGTERM);
                escalation.as_mut().reset(Instant::now() + TERMINATE_GRACE);
            }
            _ = interrupt.forced(), if interrupted && !killed => {
                killed = true;
                warn!("Killing {} ({})", program, stage);
                signal_group(group, Signal::SIGKILL);
            }
            _ = &mut escalation, if interrupted && !killed => {
                killed = true;
                warn!("{} still running after {:?}, killing", program, TERMINATE_GRACE);
                signal_group(group, Signal::SIGKILL);
            }
        }
    }

    let _ = reader.await;
    let status = child.wait().await?;
    debug!("{} exited with {}", program, status);

    if interrupted {
        return Err(DeployError::Cancelled { stage });
    }
    Ok(status)
}

/// Sends `signal` to every process in the group. A group that is already
/// gone is not an error.
fn signal_group(group: Option<Pid>, sig: Signal) {
    let Some(group) = group else {
        return;
    };
    match signal::kill(group, sig) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {:?} to process group {}: {}", sig, -group.as_raw(), e),
    }
}

fn forward_lines(stream: File, tx: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(line.to_string()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading child output: {}", e);
                break;
            }
        }
    }
}

/// Maps a non-zero exit status to `SubprocessFailure`.
pub fn check_status(stage: Stage, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(DeployError::SubprocessFailure {
            stage,
            code: status.code(),
        })
    }
}

/// Locates an executable the way a shell would.
///
/// Names containing a path separator are checked as given; bare names are
/// searched on `PATH`.
pub fn resolve_executable(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if is_executable(candidate) {
            return Ok(candidate.to_path_buf());
        }
        return Err(DeployError::not_found("executable", candidate));
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let path = dir.join(name);
            if is_executable(&path) {
                debug!("Resolved {} to {:?}", name, path);
                return Ok(path);
            }
        }
    }

    Err(DeployError::not_found("executable", name))
}

pub fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
