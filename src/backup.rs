use crate::core::BackupSelector;
use crate::error::{DeployError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const BACKUPS_DIR: &str = "backups";
pub const PROGRAMMER_DIR: &str = "bin";

/// Directory layout around the flashing tool on the field host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub tool_dir: PathBuf,
}

impl FieldLayout {
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
        }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.tool_dir.join(BACKUPS_DIR)
    }

    pub fn programmer(&self, name: &str) -> PathBuf {
        self.tool_dir.join(PROGRAMMER_DIR).join(name)
    }
}

/// Backup directory names, newest first.
///
/// Names are timestamps of fixed width, so descending lexicographic order is
/// reverse chronological order. A missing directory lists as empty.
pub fn list_backups(backups_dir: &Path) -> Result<Vec<String>> {
    if !backups_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(backups_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

pub fn latest_backup(backups_dir: &Path) -> Result<String> {
    list_backups(backups_dir)?
        .into_iter()
        .next()
        .ok_or_else(|| DeployError::not_found("backup (backup directory is empty)", backups_dir))
}

/// Resolves the artifact to flash and checks that it exists.
pub fn resolve_artifact(
    selector: &BackupSelector,
    layout: &FieldLayout,
    filename: &str,
) -> Result<PathBuf> {
    let path = match selector {
        BackupSelector::Current => layout.tool_dir.join(filename),
        BackupSelector::Latest => {
            let backups_dir = layout.backups_dir();
            let latest = latest_backup(&backups_dir)?;
            info!("Using latest backup {}", latest);
            backups_dir.join(latest).join(filename)
        }
        BackupSelector::Named(name) => layout.backups_dir().join(name).join(filename),
    };

    debug!("Resolved {:?} to {:?}", selector, path);
    if path.is_file() {
        Ok(path)
    } else {
        Err(DeployError::not_found("artifact", path))
    }
}
