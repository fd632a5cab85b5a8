use crate::core::Stage;
use std::path::PathBuf;

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Fatal failures of a deployment stage.
///
/// Pause handshake problems are deliberately absent: they are reported as
/// [`crate::pause::HandshakeMiss`] values and never stop a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("{stage} failed: {}", describe_code(*code))]
    SubprocessFailure { stage: Stage, code: Option<i32> },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} cancelled by operator")]
    Cancelled { stage: Stage },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeployError {
    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what,
            path: path.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
