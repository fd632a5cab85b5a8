pub mod backup;
pub mod builder;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod execution;
pub mod pause;
pub mod pipeline;
pub mod programmer;
pub mod signal;
pub mod transport;

use async_trait::async_trait;
use crate::core::BuildConfiguration;
use crate::error::Result;
use crate::execution::LineSink;
use crate::signal::Interrupt;
use std::path::PathBuf;

pub use crate::error::DeployError;

#[async_trait]
pub trait FirmwareBuilder: Send + Sync {
    async fn build(
        &self,
        config: &BuildConfiguration,
        sink: &mut dyn LineSink,
        interrupt: &mut Interrupt,
    ) -> Result<PathBuf>;

    /// Finds the artifact of an earlier build without rebuilding.
    fn locate(&self, config: &BuildConfiguration) -> Result<PathBuf> {
        builder::find_built_artifact(config)
    }
}

/// Builds with the Arduino command-line toolchain.
pub struct ArduinoBuilder;

impl Default for ArduinoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArduinoBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FirmwareBuilder for ArduinoBuilder {
    async fn build(
        &self,
        config: &BuildConfiguration,
        sink: &mut dyn LineSink,
        interrupt: &mut Interrupt,
    ) -> Result<PathBuf> {
        builder::build(config, sink, interrupt).await
    }
}
