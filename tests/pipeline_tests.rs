mod common;

use async_trait::async_trait;
use common::{mock_toolchain, project_dir, read_lines, write_script};
use fieldflash::backup::FieldLayout;
use fieldflash::config::{DeployConfig, FieldConfig};
use fieldflash::core::{BackupSelector, BuildConfiguration, RemoteTarget, Stage};
use fieldflash::execution::LineSink;
use fieldflash::pipeline::{DeployPipeline, FieldFlash, Mode};
use fieldflash::signal::Interrupt;
use fieldflash::{ArduinoBuilder, DeployError, FirmwareBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct MockBuilder {
    artifact: PathBuf,
    builds: AtomicUsize,
}

#[async_trait]
impl FirmwareBuilder for MockBuilder {
    async fn build(
        &self,
        _config: &BuildConfiguration,
        sink: &mut dyn LineSink,
        _interrupt: &mut Interrupt,
    ) -> fieldflash::error::Result<PathBuf> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        sink.emit("mock build");
        Ok(self.artifact.clone())
    }
}

/// Remote target whose scp copies into `<root>/remote` and whose ssh records
/// its arguments.
fn remote_target(root: &Path) -> RemoteTarget {
    let tools = root.join("tools");
    let remote = root.join("remote");
    fs::create_dir_all(&remote).unwrap();
    let scp = write_script(
        &tools,
        "scp",
        &format!("cp \"$1\" '{}/'", remote.display()),
    );
    let ssh = write_script(
        &tools,
        "ssh",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\necho flashed",
            root.join("ssh.args").display()
        ),
    );
    RemoteTarget {
        address: "pi@field".to_string(),
        scp_program: scp.display().to_string(),
        ssh_program: ssh.display().to_string(),
        ..RemoteTarget::default()
    }
}

fn deploy_config(root: &Path, toolchain_code: i32) -> DeployConfig {
    let toolchain = mock_toolchain(&root.join("tools"), &root.join("record"), toolchain_code);
    DeployConfig {
        build: BuildConfiguration {
            toolchain: toolchain.display().to_string(),
            project_dir: project_dir(root),
            ..BuildConfiguration::default()
        },
        remote: remote_target(root),
    }
}

#[tokio::test]
async fn test_full_run_builds_uploads_and_flashes() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 0);
    let builder = ArduinoBuilder::new();

    let mut lines = Vec::new();
    let mut sink = |line: &str| lines.push(line.to_string());
    let report = DeployPipeline::new(&config, &builder)
        .run(Mode::Full, &mut sink, &mut Interrupt::never())
        .await
        .unwrap();

    assert_eq!(
        report.artifact,
        temp_dir.path().join("low_level/_build/low_level.ino.hex")
    );
    assert!(report.uploaded);
    assert!(report.remote_flashed);
    assert!(temp_dir.path().join("remote/low_level.ino.hex").is_file());
    assert_eq!(
        read_lines(&temp_dir.path().join("ssh.args")),
        vec![
            "pi@field".to_string(),
            "'/home/pi/senpai-flash/fieldflash-remote'".to_string(),
        ]
    );
    assert_eq!(lines.last().map(String::as_str), Some("flashed"));
}

#[tokio::test]
async fn test_failed_build_never_uploads() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 1);
    let builder = ArduinoBuilder::new();

    let mut sink = |_: &str| {};
    let err = DeployPipeline::new(&config, &builder)
        .run(Mode::Full, &mut sink, &mut Interrupt::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::SubprocessFailure {
            stage: Stage::Build,
            code: Some(1)
        }
    ));
    assert!(fs::read_dir(temp_dir.path().join("remote")).unwrap().next().is_none());
    assert!(!temp_dir.path().join("ssh.args").exists());
}

#[tokio::test]
async fn test_build_only_skips_transport() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 0);
    let builder = ArduinoBuilder::new();

    let mut sink = |_: &str| {};
    let report = DeployPipeline::new(&config, &builder)
        .run(Mode::BuildOnly, &mut sink, &mut Interrupt::never())
        .await
        .unwrap();

    assert!(report.artifact.is_file());
    assert!(!report.uploaded);
    assert!(!temp_dir.path().join("ssh.args").exists());
}

#[tokio::test]
async fn test_flash_only_uses_previous_build() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 0);
    let builder = MockBuilder {
        artifact: temp_dir.path().join("unused.hex"),
        builds: AtomicUsize::new(0),
    };
    fs::create_dir_all(config.build.build_path()).unwrap();
    fs::write(config.build.artifact_path(), ":00000001FF\n").unwrap();

    let mut sink = |_: &str| {};
    let report = DeployPipeline::new(&config, &builder)
        .run(Mode::FlashOnly, &mut sink, &mut Interrupt::never())
        .await
        .unwrap();

    assert_eq!(builder.builds.load(Ordering::SeqCst), 0);
    assert_eq!(report.artifact, config.build.artifact_path());
    assert!(report.remote_flashed);
}

#[tokio::test]
async fn test_flash_only_without_artifact_halts() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 0);
    let builder = ArduinoBuilder::new();

    let mut sink = |_: &str| {};
    let err = DeployPipeline::new(&config, &builder)
        .run(Mode::FlashOnly, &mut sink, &mut Interrupt::never())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!temp_dir.path().join("ssh.args").exists());
}

#[tokio::test]
async fn test_mock_builder_artifact_is_uploaded() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 0);
    let artifact = temp_dir.path().join("custom.hex");
    fs::write(&artifact, ":00000001FF\n").unwrap();
    let builder = MockBuilder {
        artifact: artifact.clone(),
        builds: AtomicUsize::new(0),
    };

    let mut lines = Vec::new();
    let mut sink = |line: &str| lines.push(line.to_string());
    let report = DeployPipeline::new(&config, &builder)
        .run(Mode::Full, &mut sink, &mut Interrupt::never())
        .await
        .unwrap();

    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    assert_eq!(report.artifact, artifact);
    assert!(temp_dir.path().join("remote/custom.hex").is_file());
    assert_eq!(lines.first().map(String::as_str), Some("mock build"));
}

#[tokio::test]
async fn test_interrupted_run_does_not_start() {
    let temp_dir = TempDir::new().unwrap();
    let config = deploy_config(temp_dir.path(), 0);
    let builder = ArduinoBuilder::new();
    let (handle, mut interrupt) = Interrupt::manual();
    handle.trigger();

    let mut sink = |_: &str| {};
    let err = DeployPipeline::new(&config, &builder)
        .run(Mode::Full, &mut sink, &mut interrupt)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Cancelled { stage: Stage::Build }));
    assert!(!temp_dir.path().join("record/args").exists());
}

/// Field-host tool directory with a recording programmer that exits `code`.
fn field_tool_dir(root: &Path, code: i32) -> FieldLayout {
    let tool_dir = root.join("senpai-flash");
    write_script(
        &tool_dir.join("bin"),
        "teensy_loader_cli",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\necho Programming\nexit {}",
            root.join("loader.args").display(),
            code
        ),
    );
    FieldLayout::new(tool_dir)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn field_config(port: u16) -> FieldConfig {
    FieldConfig {
        pause_port: port,
        connect_timeout_ms: 500,
        read_timeout_ms: 500,
        ..FieldConfig::default()
    }
}

#[tokio::test]
async fn test_field_flash_proceeds_when_pause_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let layout = field_tool_dir(temp_dir.path(), 0);
    fs::write(layout.tool_dir.join("low_level.ino.hex"), ":00000001FF\n").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let job = FieldFlash {
        layout: layout.clone(),
        config: field_config(port),
        selector: BackupSelector::Current,
    };
    let mut sink = |_: &str| {};
    let report = job.run(&mut sink, &mut Interrupt::never()).await.unwrap();

    assert!(!report.pause.is_paused());
    assert!(report.session.succeeded());
    let args = read_lines(&temp_dir.path().join("loader.args"));
    assert_eq!(
        args.last().map(String::as_str),
        Some(layout.tool_dir.join("low_level.ino.hex").to_str().unwrap())
    );
}

#[tokio::test]
async fn test_field_flash_pauses_daemon_before_programming() {
    let temp_dir = TempDir::new().unwrap();
    let layout = field_tool_dir(temp_dir.path(), 0);
    let backup = layout.backups_dir().join("20230215");
    fs::create_dir_all(&backup).unwrap();
    fs::write(backup.join("low_level.ino.hex"), ":00000001FF\n").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let loader_args = temp_dir.path().join("loader.args");
    let daemon = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut token = [0u8; 1];
        socket.read_exact(&mut token).await.unwrap();
        // The programmer must not have run before the link is released.
        let programmed_early = loader_args.exists();
        socket.write_all(&token).await.unwrap();
        (token[0], programmed_early)
    });

    let job = FieldFlash {
        layout,
        config: field_config(port),
        selector: BackupSelector::Latest,
    };
    let mut sink = |_: &str| {};
    let report = job.run(&mut sink, &mut Interrupt::never()).await.unwrap();

    assert!(report.pause.is_paused());
    assert!(report.session.artifact.ends_with("backups/20230215/low_level.ino.hex"));
    let (token, programmed_early) = daemon.await.unwrap();
    assert_eq!(token, 19);
    assert!(!programmed_early);
}

#[tokio::test]
async fn test_field_flash_without_artifact_leaves_daemon_alone() {
    let temp_dir = TempDir::new().unwrap();
    let layout = field_tool_dir(temp_dir.path(), 0);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let job = FieldFlash {
        layout,
        config: field_config(port),
        selector: BackupSelector::Latest,
    };
    let mut sink = |_: &str| {};
    let err = job.run(&mut sink, &mut Interrupt::never()).await.unwrap_err();

    assert!(err.is_not_found());
    let contacted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(contacted.is_err(), "daemon was contacted");
    assert!(!temp_dir.path().join("loader.args").exists());
}

#[tokio::test]
async fn test_field_flash_reports_programmer_failure() {
    let temp_dir = TempDir::new().unwrap();
    let layout = field_tool_dir(temp_dir.path(), 1);
    fs::write(layout.tool_dir.join("low_level.ino.hex"), ":00000001FF\n").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let job = FieldFlash {
        layout,
        config: field_config(port),
        selector: BackupSelector::Current,
    };
    let mut sink = |_: &str| {};
    let report = job.run(&mut sink, &mut Interrupt::never()).await.unwrap();

    assert!(matches!(
        report.session.into_result(),
        Err(DeployError::SubprocessFailure {
            stage: Stage::Flash,
            code: Some(1)
        })
    ));
}

#[tokio::test]
async fn test_field_flash_requires_programmer() {
    let temp_dir = TempDir::new().unwrap();
    let layout = FieldLayout::new(temp_dir.path());
    fs::write(temp_dir.path().join("low_level.ino.hex"), ":00000001FF\n").unwrap();

    let job = FieldFlash {
        layout,
        config: field_config(1),
        selector: BackupSelector::Current,
    };
    let mut sink = |_: &str| {};
    let err = job.run(&mut sink, &mut Interrupt::never()).await.unwrap_err();

    match err {
        DeployError::NotFound { what, .. } => assert_eq!(what, "programmer"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_field_flash_uses_configured_artifact_name() {
    let temp_dir = TempDir::new().unwrap();
    let layout = field_tool_dir(temp_dir.path(), 0);
    fs::write(layout.tool_dir.join("low_level.ino.hex"), ":00000001FF\n").unwrap();
    fs::write(layout.tool_dir.join("bench.hex"), ":00000001FF\n").unwrap();

    let job = FieldFlash {
        layout: layout.clone(),
        config: FieldConfig {
            artifact: "bench.hex".to_string(),
            ..field_config(closed_port().await)
        },
        selector: BackupSelector::Current,
    };
    let mut sink = |_: &str| {};
    let report = job.run(&mut sink, &mut Interrupt::never()).await.unwrap();

    assert_eq!(report.session.artifact, layout.tool_dir.join("bench.hex"));
}

#[tokio::test]
async fn test_pause_socket_closes_before_programmer_starts() {
    let temp_dir = TempDir::new().unwrap();
    let layout = field_tool_dir(temp_dir.path(), 0);
    fs::write(layout.tool_dir.join("low_level.ino.hex"), ":00000001FF\n").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let loader_args = temp_dir.path().join("loader.args");
    let daemon = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut token = [0u8; 1];
        socket.read_exact(&mut token).await.unwrap();
        socket.write_all(&token).await.unwrap();
        let mut rest = Vec::new();
        socket.read_to_end(&mut rest).await.unwrap();
        loader_args.exists()
    });

    let job = FieldFlash {
        layout,
        config: field_config(port),
        selector: BackupSelector::Current,
    };
    let mut sink = |_: &str| {};
    let report = job.run(&mut sink, &mut Interrupt::never()).await.unwrap();

    assert!(report.pause.is_paused());
    let programmed_before_close = daemon.await.unwrap();
    assert!(!programmed_before_close, "socket stayed open while programming");
}
