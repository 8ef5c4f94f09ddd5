//! Update-status classification from extracted logs.
//!
//! The actual log analysis lives in an external checker; this module owns
//! the evidence requirements around it. Classification needs both the
//! install-set log and the debug log; if either is missing there is nothing
//! trustworthy to analyze, so the update is conservatively counted as failed
//! without uploading incomplete evidence.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Install-set log file expected in a machine's output directory.
pub const INSTALL_SET_LOG: &str = "installSetLogs.log";
/// Debug log file expected in a machine's output directory.
pub const DEBUG_LOG: &str = "ciDebug.log";

/// Marker the external checker embeds in its output on success.
const SUCCESS_MARKER: &str = "\u{2705}";

/// Errors from the external classifier.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The checker could not be spawned.
    #[error("Failed to spawn classifier '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The checker exited non-zero.
    #[error("Classifier '{program}' exited with {status}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
    },
}

/// Structured verdict from the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Succeeded,
    Failed,
}

/// Result of the full classification step for one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCheck {
    /// The update succeeded; artifacts can be discarded.
    Succeeded,
    /// The update failed (or the classifier errored); evidence should be
    /// uploaded for analysis.
    Failed,
    /// A required log file is absent; counted as a failed update, but the
    /// incomplete evidence is not uploaded.
    MissingEvidence,
}

/// Determines whether a machine's update attempt succeeded.
#[async_trait]
pub trait UpdateClassifier: Send + Sync {
    async fn classify(
        &self,
        install_set_log: &Path,
        debug_log: &Path,
    ) -> Result<UpdateStatus, ClassifyError>;
}

/// Runs the classification step for one machine's output directory.
///
/// Missing evidence and classifier errors both resolve to a failed update;
/// only a clean success marker counts as success.
pub async fn check_update_status(
    classifier: &dyn UpdateClassifier,
    machine_name: &str,
    machine_output: &Path,
) -> UpdateCheck {
    let install_set_log = machine_output.join(INSTALL_SET_LOG);
    let debug_log = machine_output.join(DEBUG_LOG);

    for (label, path) in [(INSTALL_SET_LOG, &install_set_log), (DEBUG_LOG, &debug_log)] {
        if !path.is_file() {
            tracing::warn!(
                machine = machine_name,
                file = label,
                path = %path.display(),
                "required log missing, counting update as failed"
            );
            return UpdateCheck::MissingEvidence;
        }
    }

    match classifier.classify(&install_set_log, &debug_log).await {
        Ok(UpdateStatus::Succeeded) => {
            tracing::info!(machine = machine_name, "update classified as successful");
            UpdateCheck::Succeeded
        }
        Ok(UpdateStatus::Failed) => {
            tracing::info!(machine = machine_name, "update classified as failed");
            UpdateCheck::Failed
        }
        Err(e) => {
            tracing::error!(
                machine = machine_name,
                error = %e,
                "classifier error, counting update as failed"
            );
            UpdateCheck::Failed
        }
    }
}

/// Classifier backed by the external checker program.
///
/// The checker receives both log paths and prints a human-readable verdict;
/// its one stable signal is the success marker in stdout.
pub struct CommandClassifier {
    program: String,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn parse_verdict(output: &str) -> UpdateStatus {
        if output.contains(SUCCESS_MARKER) {
            UpdateStatus::Succeeded
        } else {
            UpdateStatus::Failed
        }
    }
}

#[async_trait]
impl UpdateClassifier for CommandClassifier {
    async fn classify(
        &self,
        install_set_log: &Path,
        debug_log: &Path,
    ) -> Result<UpdateStatus, ClassifyError> {
        let output = Command::new(&self.program)
            .arg(install_set_log)
            .arg(debug_log)
            .output()
            .await
            .map_err(|source| ClassifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClassifyError::Failed {
                program: self.program.clone(),
                status: output.status,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(verdict = %stdout.trim(), "classifier output");
        Ok(Self::parse_verdict(&stdout))
    }
}
