use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed status file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode status record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("status read timed out after {0:?}")]
    Timeout(Duration),
    #[error("previous status read still pending")]
    ReadPending,
    #[error("status store unavailable: {0}")]
    Store(String),
    #[error("invalid coordinator configuration: {0}")]
    InvalidConfig(String),
}

impl CoordError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoordError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = CoordError> = std::result::Result<T, E>;
