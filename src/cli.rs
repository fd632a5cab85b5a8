//! Command-line surfaces of the three binaries.

use crate::config::FieldConfig;
use crate::core::BackupSelector;
use crate::pipeline::Mode;
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Build the firmware, upload it to the field host and flash it there.
#[derive(Parser, Debug)]
#[command(name = "fieldflash")]
pub struct DeployArgs {
    /// Enable verbose output during compilation
    #[arg(short, long)]
    pub verbose: bool,

    /// Remove previously compiled files before compiling
    #[arg(short, long)]
    pub clean: bool,

    /// Only build the artifact
    #[arg(short, long, conflicts_with = "flash_only")]
    pub build_only: bool,

    /// Only upload and flash the last built artifact
    #[arg(short, long)]
    pub flash_only: bool,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the project file (defaults to the configured one)
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}

impl DeployArgs {
    pub fn mode(&self) -> Mode {
        if self.build_only {
            Mode::BuildOnly
        } else if self.flash_only {
            Mode::FlashOnly
        } else {
            Mode::Full
        }
    }
}

/// Pause the live daemon and flash an artifact on this host.
#[derive(Parser, Debug)]
#[command(name = "fieldflash-remote")]
pub struct RemoteArgs {
    /// Name of the artifact to program (defaults to the configured artifact)
    pub filename: Option<String>,

    /// Program a backup instead of the current upload; the latest backup is
    /// used when no name is given
    #[arg(short, long, num_args = 0..=1, default_missing_value = "latest")]
    pub backup: Option<String>,

    /// IPv4 address of the pause socket
    #[arg(long)]
    pub ip: Option<Ipv4Addr>,

    /// TCP port of the pause socket
    #[arg(long)]
    pub tcp: Option<u16>,

    /// Pause token, 0-255
    #[arg(long)]
    pub token: Option<u8>,

    /// Name of the programmer executable under bin/
    #[arg(long = "teensy-loader")]
    pub teensy_loader: Option<String>,

    /// Directory containing bin/ and backups/ (defaults to this executable's)
    #[arg(long)]
    pub tool_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RemoteArgs {
    pub fn selector(&self) -> BackupSelector {
        BackupSelector::from_arg(self.backup.as_deref())
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut FieldConfig) {
        if let Some(ip) = self.ip {
            config.pause_ip = ip;
        }
        if let Some(port) = self.tcp {
            config.pause_port = port;
        }
        if let Some(token) = self.token {
            config.pause_token = token;
        }
        if let Some(loader) = &self.teensy_loader {
            config.programmer = loader.clone();
        }
        if let Some(filename) = &self.filename {
            config.artifact = filename.clone();
        }
    }
}

/// Ask the live daemon to resume control of the microcontroller.
#[derive(Parser, Debug)]
#[command(name = "fieldflash-resume")]
pub struct ResumeArgs {}
