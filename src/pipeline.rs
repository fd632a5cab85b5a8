//! Stage sequencing for both hosts.
//!
//! Each stage runs to completion before the next one starts, and the first
//! fatal error stops the run.

use crate::backup::{resolve_artifact, FieldLayout};
use crate::config::{DeployConfig, FieldConfig};
use crate::core::{BackupSelector, DeployReport, FlashSession, Stage};
use crate::error::{DeployError, Result};
use crate::execution::LineSink;
use crate::pause::{PauseCoordinator, PauseOutcome};
use crate::programmer::{check_programmer, flash};
use crate::signal::Interrupt;
use crate::transport::{invoke_remote_flash, upload};
use crate::FirmwareBuilder;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Full,
    BuildOnly,
    FlashOnly,
}

impl Mode {
    pub fn builds(self) -> bool {
        matches!(self, Mode::Full | Mode::BuildOnly)
    }

    pub fn flashes(self) -> bool {
        matches!(self, Mode::Full | Mode::FlashOnly)
    }
}

fn ensure_not_interrupted(interrupt: &Interrupt, stage: Stage) -> Result<()> {
    if interrupt.is_triggered() {
        Err(DeployError::Cancelled { stage })
    } else {
        Ok(())
    }
}

/// Development-host pipeline: build, upload, remote flash.
pub struct DeployPipeline<'a> {
    config: &'a DeployConfig,
    builder: &'a dyn FirmwareBuilder,
}

impl<'a> DeployPipeline<'a> {
    pub fn new(config: &'a DeployConfig, builder: &'a dyn FirmwareBuilder) -> Self {
        Self { config, builder }
    }

    pub async fn run(
        &self,
        mode: Mode,
        sink: &mut dyn LineSink,
        interrupt: &mut Interrupt,
    ) -> Result<DeployReport> {
        let start_time = Instant::now();
        if mode.flashes() {
            self.config.remote.validate()?;
        }

        let artifact = if mode.builds() {
            ensure_not_interrupted(interrupt, Stage::Build)?;
            info!("Building...");
            self.builder.build(&self.config.build, sink, interrupt).await?
        } else {
            self.builder.locate(&self.config.build)?
        };

        let mut report = DeployReport {
            artifact,
            uploaded: false,
            remote_flashed: false,
            duration_ms: 0,
        };

        if mode.flashes() {
            ensure_not_interrupted(interrupt, Stage::Upload)?;
            info!("Uploading to remote...");
            upload(&report.artifact, &self.config.remote, sink, interrupt).await?;
            report.uploaded = true;

            ensure_not_interrupted(interrupt, Stage::RemoteFlash)?;
            info!("Flashing on target...");
            invoke_remote_flash(&self.config.remote, sink, interrupt).await?;
            report.remote_flashed = true;
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[derive(Debug, Clone)]
pub struct FieldFlashReport {
    pub pause: PauseOutcome,
    pub session: FlashSession,
}

/// Field-host pipeline: resolve, pause the daemon, flash.
pub struct FieldFlash {
    pub layout: FieldLayout,
    pub config: FieldConfig,
    pub selector: BackupSelector,
}

impl FieldFlash {
    pub async fn run(
        &self,
        sink: &mut dyn LineSink,
        interrupt: &mut Interrupt,
    ) -> Result<FieldFlashReport> {
        let programmer = self.layout.programmer(&self.config.programmer);
        check_programmer(&programmer)?;

        // Nothing to flash means the daemon is left alone.
        let artifact = resolve_artifact(&self.selector, &self.layout, &self.config.artifact)?;

        ensure_not_interrupted(interrupt, Stage::Flash)?;
        let pause = PauseCoordinator::from_config(&self.config)
            .request_pause()
            .await;

        ensure_not_interrupted(interrupt, Stage::Flash)?;
        let session = flash(&artifact, &self.config.mcu, &programmer, sink, interrupt).await?;
        Ok(FieldFlashReport { pause, session })
    }
}
