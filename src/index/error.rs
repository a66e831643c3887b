use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while accessing the persisted index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Timed out after {timeout:?} waiting for the index {access} lock")]
    LockTimeout {
        access: &'static str,
        timeout: Duration,
    },

    #[error("No index record for {path}")]
    RecordNotFound { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn read_timeout(timeout: Duration) -> Self {
        Self::LockTimeout {
            access: "read",
            timeout,
        }
    }

    pub fn write_timeout(timeout: Duration) -> Self {
        Self::LockTimeout {
            access: "write",
            timeout,
        }
    }

    pub fn record_not_found<P: AsRef<Path>>(path: P) -> Self {
        Self::RecordNotFound {
            path: path.as_ref().to_path_buf(),
        }
    }
}
