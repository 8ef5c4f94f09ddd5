//! Run orchestration: cleanup, machine iteration, counters and the
//! downstream trigger decision.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::analytics;
use crate::config::PipelineConfig;
use crate::storage::ObjectStore;
use crate::trigger::DownstreamTrigger;

use super::machine::{discover_machines, MachinePipeline, PipelineOutcome, UploadOutcome};

/// Errors that abort a run before or between machines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The machine source root does not exist.
    #[error("Source directory '{0}' not found, cannot process machines")]
    SourceRootMissing(PathBuf),

    /// Machine discovery failed.
    #[error("Failed to discover machines: {0}")]
    Discovery(#[source] std::io::Error),
}

/// Aggregated result of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Machines discovered and processed.
    pub machines_processed: usize,
    /// Updates classified successful this run.
    pub successful_updates: u64,
    /// Updates classified failed this run.
    pub failed_updates: u64,
    /// Pipeline-level failures (prepare/extract/upload), one entry per
    /// failed step, upload failures suffixed with `(upload)`.
    pub failures: Vec<String>,
    /// Whether the downstream trigger was left set.
    pub trigger_required: bool,
    /// Wall-clock duration of the run.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

mod duration_secs {
    use super::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

impl RunSummary {
    /// A run succeeds iff no pipeline-level failure occurred, independent
    /// of the trigger decision and of individual update outcomes.
    pub fn overall_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Coordinates one batch run over all machines.
pub struct Orchestrator<S> {
    config: PipelineConfig,
    pipeline: MachinePipeline<S>,
    trigger: DownstreamTrigger,
}

impl<S: ObjectStore> Orchestrator<S> {
    pub fn new(config: PipelineConfig, pipeline: MachinePipeline<S>) -> Self {
        let trigger = DownstreamTrigger::new(config.signal_file.clone());
        Self {
            config,
            pipeline,
            trigger,
        }
    }

    /// Runs the full batch: cleanup, per-machine pipelines, analytics and
    /// the downstream trigger decision.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        // Best-effort cleanup; a failure here degrades the run but does not
        // abort it.
        if let Err(e) = self.cleanup().await {
            tracing::warn!(error = %e, "cleanup failed or partially failed, continuing cautiously");
        }

        if !self.config.source_root.is_dir() {
            return Err(PipelineError::SourceRootMissing(
                self.config.source_root.clone(),
            ));
        }

        let machines = discover_machines(&self.config.source_root, &self.config.output_root)
            .map_err(PipelineError::Discovery)?;

        if machines.is_empty() {
            tracing::warn!(
                source_root = %self.config.source_root.display(),
                "no machine directories found, nothing to do"
            );
        } else {
            tracing::info!(
                count = machines.len(),
                machines = %machines.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", "),
                "found machines to process"
            );
        }

        let mut successful_updates = 0u64;
        let mut failed_updates = 0u64;
        let mut failures = Vec::new();

        for machine in &machines {
            match self.pipeline.run(machine).await {
                PipelineOutcome::PrepFailed | PipelineOutcome::ExtractFailed => {
                    failures.push(machine.name.clone());
                }
                PipelineOutcome::UpdateSucceeded => {
                    successful_updates += 1;
                }
                PipelineOutcome::UpdateFailed { upload } => {
                    failed_updates += 1;
                    if upload == UploadOutcome::Failed {
                        failures.push(format!("{} (upload)", machine.name));
                    }
                }
            }
        }

        if successful_updates > 0 || failed_updates > 0 {
            analytics::record_best_effort(
                self.config.database_url.as_deref(),
                successful_updates,
                failed_updates,
            )
            .await;
        }

        let trigger_required = self.decide_trigger(failed_updates);

        let summary = RunSummary {
            machines_processed: machines.len(),
            successful_updates,
            failed_updates,
            failures,
            trigger_required,
            elapsed: started.elapsed(),
        };

        if summary.overall_success() {
            tracing::info!(
                machines = summary.machines_processed,
                successes = summary.successful_updates,
                failures = summary.failed_updates,
                elapsed_secs = summary.elapsed.as_secs_f64(),
                "run completed successfully"
            );
        } else {
            tracing::warn!(
                failed_steps = %summary.failures.join(", "),
                "run completed with one or more failures"
            );
        }

        Ok(summary)
    }

    /// Removes and recreates the output root, and clears residual scratch
    /// directories left in machine source dirs by prior runs.
    async fn cleanup(&self) -> std::io::Result<()> {
        let output_root = &self.config.output_root;
        if output_root.exists() {
            tracing::info!(path = %output_root.display(), "removing existing output directory");
            tokio::fs::remove_dir_all(output_root).await?;
        }
        tokio::fs::create_dir_all(output_root).await?;

        if self.config.source_root.is_dir() {
            let removed = self.remove_scratch_dirs(&self.config.source_root).await;
            tracing::info!(
                count = removed,
                name = %self.config.scratch_dir_name,
                "removed residual scratch directories"
            );
        }
        Ok(())
    }

    /// Recursively removes directories named `scratch_dir_name` under
    /// `root`. Individual removal failures are warnings.
    async fn remove_scratch_dirs(&self, root: &Path) -> usize {
        let mut removed = 0;
        let mut it = WalkDir::new(root).into_iter();
        while let Some(entry) = it.next() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "could not walk source directory entry");
                    continue;
                }
            };
            if entry.file_type().is_dir()
                && entry.file_name().to_string_lossy() == self.config.scratch_dir_name
            {
                match tokio::fs::remove_dir_all(entry.path()).await {
                    Ok(()) => {
                        removed += 1;
                        it.skip_current_dir();
                    }
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "could not remove scratch directory");
                    }
                }
            }
        }
        removed
    }

    /// Sets or clears the downstream trigger.
    ///
    /// An empty output root means nothing is left for downstream processing,
    /// so the trigger clears regardless of counted failures; otherwise it is
    /// set iff any update failed this run. Trigger errors never change the
    /// run outcome.
    fn decide_trigger(&self, failed_updates: u64) -> bool {
        let output_has_machines = std::fs::read_dir(&self.config.output_root)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .any(|e| e.path().is_dir())
            })
            .unwrap_or(false);

        let required = if !output_has_machines {
            tracing::info!("output directory is empty, downstream analysis not needed");
            false
        } else if failed_updates > 0 {
            tracing::info!(
                failures = failed_updates,
                "downstream analysis required for failed updates"
            );
            true
        } else {
            tracing::info!("all machines successful or removed, downstream analysis not needed");
            false
        };

        if let Err(e) = self.trigger.set(required) {
            tracing::error!(error = %e, "failed to manage downstream signal file");
        }
        required
    }
}
