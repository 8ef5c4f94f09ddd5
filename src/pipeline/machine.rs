//! Machine discovery and the per-machine pipeline.
//!
//! One `Machine` is one unit of work: a named source directory paired with
//! an output directory for extracted artifacts. The pipeline runs a linear
//! state machine with early exits: prepare, extract, classify, then either
//! discard the artifacts (update succeeded) or upload them (update failed).

use std::io;
use std::path::{Path, PathBuf};

use crate::storage::{MachineUploader, ObjectStore};

use super::classify::{check_update_status, UpdateCheck, UpdateClassifier};
use super::tasks::{LogExtractor, MachinePreparer};

/// One unit of work: a machine's source and output directories.
///
/// Immutable for the run; created by directory discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Discovers machines as immediate subdirectories of the source root,
/// in lexicographic order for determinism.
pub fn discover_machines(source_root: &Path, output_root: &Path) -> io::Result<Vec<Machine>> {
    let mut machines = Vec::new();
    for entry in std::fs::read_dir(source_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        machines.push(Machine {
            source_dir: entry.path(),
            output_dir: output_root.join(&name),
            name,
        });
    }
    machines.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(machines)
}

/// Disposition of the upload step within a machine's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No upload was attempted (incomplete evidence).
    Skipped,
    /// The batch met the success threshold.
    Uploaded,
    /// The batch failed; some objects may still exist remotely.
    Failed,
}

/// Final outcome of the pipeline for one machine. Produced exactly once per
/// machine per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Preparation failed; extraction was skipped.
    PrepFailed,
    /// Log extraction failed; no classification happened.
    ExtractFailed,
    /// The update succeeded; artifacts were discarded.
    UpdateSucceeded,
    /// The update failed; artifacts were kept and possibly uploaded.
    UpdateFailed { upload: UploadOutcome },
}

impl PipelineOutcome {
    /// Whether this outcome counts as a pipeline-level failure
    /// (prepare/extract/upload), as opposed to an update failure.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            PipelineOutcome::PrepFailed
                | PipelineOutcome::ExtractFailed
                | PipelineOutcome::UpdateFailed {
                    upload: UploadOutcome::Failed
                }
        )
    }

    /// Whether the update itself was classified (successfully or not).
    pub fn update_classified(&self) -> bool {
        matches!(
            self,
            PipelineOutcome::UpdateSucceeded | PipelineOutcome::UpdateFailed { .. }
        )
    }
}

/// Per-machine sequencing of the external collaborators and the uploader.
pub struct MachinePipeline<S> {
    preparer: Box<dyn MachinePreparer>,
    extractor: Box<dyn LogExtractor>,
    classifier: Box<dyn UpdateClassifier>,
    uploader: MachineUploader<S>,
    source_root: PathBuf,
    output_root: PathBuf,
}

impl<S: ObjectStore> MachinePipeline<S> {
    pub fn new(
        preparer: Box<dyn MachinePreparer>,
        extractor: Box<dyn LogExtractor>,
        classifier: Box<dyn UpdateClassifier>,
        uploader: MachineUploader<S>,
        source_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            preparer,
            extractor,
            classifier,
            uploader,
            source_root: source_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Runs the full per-machine pipeline and returns its outcome.
    pub async fn run(&self, machine: &Machine) -> PipelineOutcome {
        tracing::info!(machine = %machine.name, "processing machine");

        if let Err(e) = self.preparer.prepare(&machine.source_dir).await {
            tracing::warn!(machine = %machine.name, error = %e, "preparation failed, skipping extraction");
            return PipelineOutcome::PrepFailed;
        }
        tracing::info!(machine = %machine.name, "preparation successful");

        if let Err(e) = self
            .extractor
            .extract(&machine.name, &self.source_root, &self.output_root)
            .await
        {
            tracing::warn!(machine = %machine.name, error = %e, "log extraction failed");
            return PipelineOutcome::ExtractFailed;
        }
        tracing::info!(machine = %machine.name, "log extraction successful");

        match check_update_status(self.classifier.as_ref(), &machine.name, &machine.output_dir)
            .await
        {
            UpdateCheck::Succeeded => {
                self.discard_artifacts(machine).await;
                PipelineOutcome::UpdateSucceeded
            }
            UpdateCheck::MissingEvidence => PipelineOutcome::UpdateFailed {
                upload: UploadOutcome::Skipped,
            },
            UpdateCheck::Failed => PipelineOutcome::UpdateFailed {
                upload: self.upload_artifacts(machine).await,
            },
        }
    }

    /// Removes a successful machine's output directory so downstream
    /// processing never sees it. Invariant: the output directory is deleted
    /// iff the update was classified successful.
    async fn discard_artifacts(&self, machine: &Machine) {
        tracing::info!(machine = %machine.name, "update successful, skipping upload");
        match tokio::fs::remove_dir_all(&machine.output_dir).await {
            Ok(()) => {
                tracing::info!(machine = %machine.name, "removed output directory");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    machine = %machine.name,
                    path = %machine.output_dir.display(),
                    "output directory already absent"
                );
            }
            Err(e) => {
                tracing::error!(machine = %machine.name, error = %e, "failed to remove output directory");
            }
        }
    }

    /// Uploads a failed machine's artifacts for later analysis.
    async fn upload_artifacts(&self, machine: &Machine) -> UploadOutcome {
        tracing::info!(machine = %machine.name, "update failed, uploading evidence");
        match self
            .uploader
            .upload_machine(&machine.name, &self.output_root)
            .await
        {
            Ok(report) if report.succeeded() => UploadOutcome::Uploaded,
            Ok(report) => {
                tracing::warn!(
                    machine = %machine.name,
                    uploaded = report.uploaded,
                    total = report.total,
                    "upload only partially successful"
                );
                UploadOutcome::Failed
            }
            Err(e) => {
                tracing::error!(machine = %machine.name, error = %e, "upload failed");
                UploadOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discovery_is_sorted_and_ignores_files() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::create_dir(source.path().join("zeta")).unwrap();
        fs::create_dir(source.path().join("alpha")).unwrap();
        fs::write(source.path().join("notes.txt"), "not a machine").unwrap();

        let machines = discover_machines(source.path(), output.path()).unwrap();
        let names: Vec<&str> = machines.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(machines[0].output_dir, output.path().join("alpha"));
    }

    #[test]
    fn discovery_missing_root_is_an_error() {
        let output = TempDir::new().unwrap();
        assert!(discover_machines(Path::new("/nonexistent/machines"), output.path()).is_err());
    }

    #[test]
    fn pipeline_failure_taxonomy() {
        assert!(PipelineOutcome::PrepFailed.is_pipeline_failure());
        assert!(PipelineOutcome::ExtractFailed.is_pipeline_failure());
        assert!(PipelineOutcome::UpdateFailed {
            upload: UploadOutcome::Failed
        }
        .is_pipeline_failure());

        // Update failures with a clean (or skipped) upload are not
        // pipeline failures.
        assert!(!PipelineOutcome::UpdateSucceeded.is_pipeline_failure());
        assert!(!PipelineOutcome::UpdateFailed {
            upload: UploadOutcome::Uploaded
        }
        .is_pipeline_failure());
        assert!(!PipelineOutcome::UpdateFailed {
            upload: UploadOutcome::Skipped
        }
        .is_pipeline_failure());
    }

    #[test]
    fn update_classified_only_after_extraction() {
        assert!(!PipelineOutcome::PrepFailed.update_classified());
        assert!(!PipelineOutcome::ExtractFailed.update_classified());
        assert!(PipelineOutcome::UpdateSucceeded.update_classified());
        assert!(PipelineOutcome::UpdateFailed {
            upload: UploadOutcome::Skipped
        }
        .update_classified());
    }
}
