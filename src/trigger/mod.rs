//! Downstream trigger file.
//!
//! A separate analyzer process decides whether to run by checking for a
//! marker file. At most one marker exists at a time; setting and clearing
//! are both idempotent.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from trigger-file operations.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Failed to manage signal file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem marker signaling that downstream analysis is required.
pub struct DownstreamTrigger {
    path: PathBuf,
}

impl DownstreamTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the marker when `required`, removes it otherwise.
    ///
    /// Creating an existing marker and removing an absent one are both
    /// no-ops, not errors.
    pub fn set(&self, required: bool) -> Result<(), TriggerError> {
        let io_err = |source| TriggerError::Io {
            path: self.path.clone(),
            source,
        };

        if required {
            fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&self.path)
                .map_err(io_err)?;
            tracing::info!(path = %self.path.display(), "created downstream signal file");
        } else {
            match fs::remove_file(&self.path) {
                Ok(()) => {
                    tracing::info!(path = %self.path.display(), "removed downstream signal file");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            }
        }
        Ok(())
    }

    /// Whether the marker currently exists.
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }
}
