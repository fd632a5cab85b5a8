//! Deployment settings.
//!
//! Every value has a built-in default and can be overridden from a JSON file.
//! Keys missing from the file keep their defaults. A config value is built
//! once by the binary and handed to each stage.

use crate::core::{BuildConfiguration, RemoteTarget};
use crate::error::{DeployError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "FIELDFLASH_CONFIG";

pub const DEFAULT_ARTIFACT: &str = "low_level.ino.hex";
pub const DEFAULT_PAUSE_PORT: u16 = 23747;
pub const DEFAULT_PAUSE_TOKEN: u8 = 19;
pub const DEFAULT_RESUME_TOKEN: u8 = 20;

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            toolchain: "arduino_debug".to_string(),
            project_dir: PathBuf::from("."),
            project_file: "low_level.ino".to_string(),
            board: "teensy:avr:teensy35".to_string(),
            board_options: ":usb=serial,speed=120,opt=o2std,keys=en-us".to_string(),
            build_dir: PathBuf::from("_build"),
            clean: false,
            verbose: false,
        }
    }
}

impl Default for RemoteTarget {
    fn default() -> Self {
        Self {
            address: "pi@192.168.0.25".to_string(),
            base_dir: "/home/pi".to_string(),
            folder: "senpai-flash".to_string(),
            entry_point: "fieldflash-remote".to_string(),
            scp_program: "scp".to_string(),
            ssh_program: "ssh".to_string(),
        }
    }
}

/// Settings for the development-host binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub build: BuildConfiguration,
    pub remote: RemoteTarget,
}

impl DeployConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_or_default(path)
    }
}

/// Settings for the field-host binaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub pause_ip: Ipv4Addr,
    pub pause_port: u16,
    pub pause_token: u8,
    pub resume_token: u8,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub resume_timeout_ms: u64,
    pub mcu: String,
    pub programmer: String,
    pub artifact: String,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            pause_ip: Ipv4Addr::LOCALHOST,
            pause_port: DEFAULT_PAUSE_PORT,
            pause_token: DEFAULT_PAUSE_TOKEN,
            resume_token: DEFAULT_RESUME_TOKEN,
            connect_timeout_ms: 2000,
            read_timeout_ms: 2000,
            resume_timeout_ms: 100,
            mcu: "mk64fx512".to_string(),
            programmer: "teensy_loader_cli".to_string(),
            artifact: DEFAULT_ARTIFACT.to_string(),
        }
    }
}

impl FieldConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = load_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pause_token == self.resume_token {
            return Err(DeployError::InvalidConfig(format!(
                "pause and resume tokens must differ (both are {})",
                self.pause_token
            )));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 || self.resume_timeout_ms == 0
        {
            return Err(DeployError::InvalidConfig(
                "handshake timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pause_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.pause_ip, self.pause_port))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn resume_timeout(&self) -> Duration {
        Duration::from_millis(self.resume_timeout_ms)
    }
}

/// Explicit path first, then `FIELDFLASH_CONFIG`, then built-in defaults.
fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => env::var_os(CONFIG_ENV).map(PathBuf::from),
    };

    match path {
        Some(path) => read_json(&path),
        None => Ok(T::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    tracing::debug!("Loading configuration from {:?}", path);
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeployError::not_found("configuration file", path)
        } else {
            DeployError::Io(e)
        }
    })?;
    serde_json::from_str(&content).map_err(|source| DeployError::Config {
        path: path.to_path_buf(),
        source,
    })
}
