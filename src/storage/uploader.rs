//! Per-machine directory upload into the object store.
//!
//! Walks a machine's extracted-log directory, uploads every file under a
//! sanitized machine prefix with bounded per-file retry, and reports the
//! batch outcome. Remote state mutates incrementally and is never rolled
//! back: a failed batch can still leave objects behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use walkdir::WalkDir;

use super::keys::sanitize_name;
use super::object_store::{ObjectStore, ObjectStoreError};

/// Minimum fraction of files that must upload for the batch to count as
/// successful. Partial loss below this is tolerated.
const SUCCESS_RATE_THRESHOLD: f64 = 0.80;

/// Errors that abort an upload batch before any per-file attempts.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The machine's local output directory does not exist.
    #[error("Output directory not found: {0} (was log extraction run?)")]
    MissingOutputDir(PathBuf),

    /// The target bucket could not be checked or created.
    #[error("Bucket unavailable: {0}")]
    Bucket(#[source] ObjectStoreError),

    /// Walking the local directory failed.
    #[error("Failed to walk output directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Bounded retry for individual file uploads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per file, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Outcome counters for one upload batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadReport {
    /// Files uploaded successfully.
    pub uploaded: usize,
    /// Files that exhausted all attempts.
    pub failed: usize,
    /// Files discovered under the machine's output directory.
    pub total: usize,
}

impl UploadReport {
    /// Fraction of files uploaded, 1.0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.uploaded as f64 / self.total as f64
        }
    }

    /// Whether the batch counts as successful (rate-thresholded, not 100%).
    pub fn succeeded(&self) -> bool {
        self.success_rate() >= SUCCESS_RATE_THRESHOLD
    }
}

/// Uploads one machine's output directory into a fixed bucket.
pub struct MachineUploader<S> {
    store: S,
    bucket: String,
    policy: RetryPolicy,
}

impl<S: ObjectStore> MachineUploader<S> {
    pub fn new(store: S, bucket: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            policy,
        }
    }

    /// Uploads all files under `output_root/<machine_name>`.
    ///
    /// Keys are `<sanitized machine name>/<relative path>` with forward
    /// slashes regardless of host convention. A file that exhausts its
    /// attempts is counted failed and the batch continues; the returned
    /// report decides success via the rate threshold.
    pub async fn upload_machine(
        &self,
        machine_name: &str,
        output_root: &Path,
    ) -> Result<UploadReport, UploadError> {
        let local_dir = output_root.join(machine_name);
        if !local_dir.is_dir() {
            return Err(UploadError::MissingOutputDir(local_dir));
        }

        self.store
            .ensure_bucket(&self.bucket)
            .await
            .map_err(UploadError::Bucket)?;

        let prefix = sanitize_name(machine_name);
        let files = collect_relative_files(&local_dir)?;

        if files.is_empty() {
            tracing::warn!(machine = machine_name, "no files found to upload");
            return Ok(UploadReport::default());
        }

        let mut report = UploadReport {
            total: files.len(),
            ..Default::default()
        };
        tracing::info!(
            machine = machine_name,
            prefix = %prefix,
            total = report.total,
            "starting upload"
        );

        for (index, relative) in files.iter().enumerate() {
            let key = format!("{}/{}", prefix, forward_slashed(relative));
            let path = local_dir.join(relative);

            let file_number = index + 1;
            if file_number == 1 || file_number % 10 == 0 || file_number == report.total {
                tracing::info!(
                    machine = machine_name,
                    file = file_number,
                    total = report.total,
                    "upload progress"
                );
            }

            if self.put_with_retry(&key, &path).await {
                report.uploaded += 1;
            } else {
                report.failed += 1;
            }
        }

        tracing::info!(
            machine = machine_name,
            uploaded = report.uploaded,
            failed = report.failed,
            total = report.total,
            rate = %format!("{:.1}%", report.success_rate() * 100.0),
            "upload finished"
        );

        Ok(report)
    }

    /// Attempts one file up to `max_attempts` times with fixed backoff.
    async fn put_with_retry(&self, key: &str, path: &Path) -> bool {
        for attempt in 1..=self.policy.max_attempts {
            match self.store.put_file(&self.bucket, key, path).await {
                Ok(()) => return true,
                Err(e) if attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        key,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "upload attempt failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(e) => {
                    tracing::error!(key, error = %e, "upload failed after all attempts");
                }
            }
        }
        false
    }
}

/// Collects file paths under `dir`, relative to it, sorted for determinism.
fn collect_relative_files(dir: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .expect("walked path is under its root")
                .to_path_buf();
            files.push(relative);
        }
    }
    files.sort();
    Ok(files)
}

/// Joins path components with `/`, independent of the host separator.
fn forward_slashed(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
