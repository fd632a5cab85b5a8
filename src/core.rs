use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use uuid::Uuid;

/// Extension appended to the project file name to form the artifact name.
pub const ARTIFACT_EXTENSION: &str = "hex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Build,
    Upload,
    RemoteFlash,
    Flash,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Build => "build",
            Stage::Upload => "upload",
            Stage::RemoteFlash => "remote flash",
            Stage::Flash => "flash",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfiguration {
    /// Executable name looked up on `PATH`, or a path to it.
    pub toolchain: String,
    pub project_dir: PathBuf,
    pub project_file: String,
    pub board: String,
    pub board_options: String,
    /// Relative paths are taken from `project_dir`.
    pub build_dir: PathBuf,
    pub clean: bool,
    pub verbose: bool,
}

impl BuildConfiguration {
    pub fn project_path(&self) -> PathBuf {
        self.project_dir.join(&self.project_file)
    }

    pub fn build_path(&self) -> PathBuf {
        if self.build_dir.is_absolute() {
            self.build_dir.clone()
        } else {
            self.project_dir.join(&self.build_dir)
        }
    }

    /// Where a successful build leaves its artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.build_path().join(self.artifact_name())
    }

    pub fn artifact_name(&self) -> String {
        format!("{}.{}", self.project_file, ARTIFACT_EXTENSION)
    }

    pub fn board_spec(&self) -> String {
        format!("{}{}", self.board, self.board_options)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTarget {
    /// `user@host` as understood by scp and ssh.
    pub address: String,
    pub base_dir: String,
    pub folder: String,
    pub entry_point: String,
    pub scp_program: String,
    pub ssh_program: String,
}

impl RemoteTarget {
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(DeployError::InvalidConfig(
                "remote address must not be empty".to_string(),
            ));
        }
        if self.entry_point.trim().is_empty() {
            return Err(DeployError::InvalidConfig(
                "remote entry point must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn remote_dir(&self) -> String {
        let base = self.base_dir.trim_end_matches('/');
        if self.folder.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, self.folder.trim_matches('/'))
        }
    }

    /// Destination argument for the copy program.
    pub fn copy_destination(&self) -> String {
        format!("{}:{}", self.address, self.remote_dir())
    }

    pub fn entry_point_path(&self) -> String {
        format!("{}/{}", self.remote_dir(), self.entry_point)
    }
}

/// Which artifact the field host should write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSelector {
    /// The artifact most recently uploaded next to the flashing tool.
    Current,
    Latest,
    Named(String),
}

impl BackupSelector {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => BackupSelector::Current,
            Some("latest") => BackupSelector::Latest,
            Some(name) => BackupSelector::Named(name.to_string()),
        }
    }
}

/// One run of the hardware programmer.
#[derive(Debug, Clone)]
pub struct FlashSession {
    pub id: Uuid,
    pub artifact: PathBuf,
    pub mcu: String,
    pub programmer: PathBuf,
    pub exit_status: Option<ExitStatus>,
}

impl FlashSession {
    pub fn new(artifact: &Path, mcu: &str, programmer: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact: artifact.to_path_buf(),
            mcu: mcu.to_string(),
            programmer: programmer.to_path_buf(),
            exit_status: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_status.map_or(false, |status| status.success())
    }

    pub fn into_result(self) -> Result<Self> {
        match self.exit_status {
            Some(status) if status.success() => Ok(self),
            status => Err(DeployError::SubprocessFailure {
                stage: Stage::Flash,
                code: status.and_then(|s| s.code()),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub artifact: PathBuf,
    pub uploaded: bool,
    pub remote_flashed: bool,
    pub duration_ms: u64,
}
