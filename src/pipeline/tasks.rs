//! External collaborators: machine preparation and log extraction.
//!
//! Both steps are owned by separate tooling; the pipeline only needs a
//! success/failure answer (extraction additionally populates the machine's
//! output directory as a side effect). The production implementations spawn
//! the configured programs; tests substitute stubs through the traits.

use std::path::Path;
use std::process::ExitStatus;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Errors from external task invocations. An `Err` means the collaborator
/// reported failure for this machine; the pipeline records it and moves on.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The program could not be spawned at all.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero.
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Prepares a machine's source directory for extraction.
#[async_trait]
pub trait MachinePreparer: Send + Sync {
    async fn prepare(&self, machine_dir: &Path) -> Result<(), TaskError>;
}

/// Extracts log artifacts for a machine into its output directory.
#[async_trait]
pub trait LogExtractor: Send + Sync {
    async fn extract(
        &self,
        machine_name: &str,
        source_root: &Path,
        output_root: &Path,
    ) -> Result<(), TaskError>;
}

/// Runs `program` with `args`, mapping a non-zero exit to `TaskError::Failed`
/// with the captured stderr.
async fn run_program(program: &str, args: &[&str]) -> Result<(), TaskError> {
    tracing::debug!(program, ?args, "running external task");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| TaskError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(TaskError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Preparation via an external program invoked with the machine directory.
pub struct CommandPreparer {
    program: String,
}

impl CommandPreparer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MachinePreparer for CommandPreparer {
    async fn prepare(&self, machine_dir: &Path) -> Result<(), TaskError> {
        run_program(&self.program, &[&machine_dir.to_string_lossy()]).await
    }
}

/// Extraction via an external program invoked with machine name and roots.
pub struct CommandExtractor {
    program: String,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl LogExtractor for CommandExtractor {
    async fn extract(
        &self,
        machine_name: &str,
        source_root: &Path,
        output_root: &Path,
    ) -> Result<(), TaskError> {
        run_program(
            &self.program,
            &[
                machine_name,
                &source_root.to_string_lossy(),
                &output_root.to_string_lossy(),
            ],
        )
        .await
    }
}
