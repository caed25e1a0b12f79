use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("remote unavailable: {0}")]
    Remote(String),

    #[error("git {op} failed\n  stdout: {stdout}\n  stderr: {stderr}")]
    Vcs {
        op: String,
        stdout: String,
        stderr: String,
    },

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("task join error: {0}")]
    Join(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ReconcileError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn vcs(op: impl Into<String>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Vcs {
            op: op.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Errors that leave the working copy in an unknown state. The scheduler
    /// counts these toward its escalation threshold; everything else is retried
    /// on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Vcs { .. }
                | Self::Filesystem { .. }
                | Self::Io(_)
                | Self::InvalidConfig(_)
                | Self::Join(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
