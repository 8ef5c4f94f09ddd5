//! End-to-end pipeline runs against an in-memory object store and stub
//! collaborators.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use logtriage::config::PipelineConfig;
use logtriage::pipeline::{
    ClassifyError, LogExtractor, MachinePipeline, MachinePreparer, Orchestrator, TaskError,
    UpdateClassifier, UpdateStatus, DEBUG_LOG, INSTALL_SET_LOG,
};
use logtriage::storage::{MachineUploader, ObjectStore, ObjectStoreError, RetryPolicy};

/// In-memory object store shared between the uploader and assertions.
/// With `fail_puts` set, every put is rejected and nothing is stored.
#[derive(Clone, Default)]
struct MemoryStore {
    objects: Arc<Mutex<Vec<String>>>,
    fail_puts: bool,
}

impl MemoryStore {
    fn keys(&self) -> Vec<String> {
        let mut keys = self.objects.lock().unwrap().clone();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_bucket(&self, _bucket: &str) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn put_file(
        &self,
        _bucket: &str,
        key: &str,
        _path: &Path,
    ) -> Result<(), ObjectStoreError> {
        if self.fail_puts {
            return Err(ObjectStoreError::Put {
                key: key.to_string(),
                message: "injected put failure".to_string(),
            });
        }
        self.objects.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Preparer that fails for a configured set of machines.
struct StubPreparer {
    fail_for: HashSet<String>,
}

#[async_trait]
impl MachinePreparer for StubPreparer {
    async fn prepare(&self, machine_dir: &Path) -> Result<(), TaskError> {
        let name = machine_dir.file_name().unwrap().to_string_lossy();
        if self.fail_for.contains(name.as_ref()) {
            Err(TaskError::Spawn {
                program: "stub-prepare".to_string(),
                source: std::io::Error::other("injected prep failure"),
            })
        } else {
            Ok(())
        }
    }
}

/// Extractor that writes the two expected logs (plus an artifact) into the
/// machine's output directory. Machines in `fail_for` get a hard error;
/// machines in `skip_logs_for` report success without creating anything.
struct StubExtractor {
    fail_for: HashSet<String>,
    skip_logs_for: HashSet<String>,
}

#[async_trait]
impl LogExtractor for StubExtractor {
    async fn extract(
        &self,
        machine_name: &str,
        _source_root: &Path,
        output_root: &Path,
    ) -> Result<(), TaskError> {
        if self.fail_for.contains(machine_name) {
            return Err(TaskError::Spawn {
                program: "stub-extract".to_string(),
                source: std::io::Error::other("injected extract failure"),
            });
        }
        if self.skip_logs_for.contains(machine_name) {
            return Ok(());
        }
        let dir = output_root.join(machine_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(INSTALL_SET_LOG), "install log").unwrap();
        fs::write(dir.join(DEBUG_LOG), "debug log").unwrap();
        fs::write(dir.join("extra.bin"), "artifact").unwrap();
        Ok(())
    }
}

/// Classifier with a fixed per-machine verdict, keyed by the output
/// directory name.
struct StubClassifier {
    succeed_for: HashSet<String>,
}

#[async_trait]
impl UpdateClassifier for StubClassifier {
    async fn classify(
        &self,
        install_set_log: &Path,
        _debug_log: &Path,
    ) -> Result<UpdateStatus, ClassifyError> {
        let machine = install_set_log
            .parent()
            .and_then(|p| p.file_name())
            .unwrap()
            .to_string_lossy();
        if self.succeed_for.contains(machine.as_ref()) {
            Ok(UpdateStatus::Succeeded)
        } else {
            Ok(UpdateStatus::Failed)
        }
    }
}

struct Fixture {
    _workspace: TempDir,
    config: PipelineConfig,
    store: MemoryStore,
}

fn names(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Builds a workspace with the given machine source directories and a
/// config pointing at it. No database URL: analytics downgrade to a
/// warning, which is the best-effort contract.
fn fixture(machines: &[&str]) -> Fixture {
    let workspace = TempDir::new().unwrap();
    let source_root = workspace.path().join("machines");
    fs::create_dir_all(&source_root).unwrap();
    for machine in machines {
        fs::create_dir_all(source_root.join(machine)).unwrap();
    }

    let config = PipelineConfig {
        source_root,
        output_root: workspace.path().join("output"),
        signal_file: workspace.path().join("NEEDS_MASTER"),
        prepare_command: "stub".to_string(),
        extract_command: "stub".to_string(),
        classify_command: "stub".to_string(),
        upload_backoff: Duration::ZERO,
        ..Default::default()
    };

    Fixture {
        _workspace: workspace,
        config,
        store: MemoryStore::default(),
    }
}

fn build_orchestrator(
    fixture: &Fixture,
    prep_fail: &[&str],
    extract_fail: &[&str],
    skip_logs: &[&str],
    update_success: &[&str],
) -> Orchestrator<MemoryStore> {
    let uploader = MachineUploader::new(
        fixture.store.clone(),
        fixture.config.bucket.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        },
    );
    let pipeline = MachinePipeline::new(
        Box::new(StubPreparer {
            fail_for: names(prep_fail),
        }),
        Box::new(StubExtractor {
            fail_for: names(extract_fail),
            skip_logs_for: names(skip_logs),
        }),
        Box::new(StubClassifier {
            succeed_for: names(update_success),
        }),
        uploader,
        fixture.config.source_root.clone(),
        fixture.config.output_root.clone(),
    );
    Orchestrator::new(fixture.config.clone(), pipeline)
}

#[tokio::test]
async fn three_machine_run_mixes_outcomes() {
    let fixture = fixture(&["alpha", "bravo", "charlie"]);
    // alpha fails preparation, bravo's update succeeded, charlie's failed.
    let orchestrator = build_orchestrator(&fixture, &["alpha"], &[], &[], &["bravo"]);

    let summary = orchestrator.run().await.unwrap();

    // The prep failure makes the run fail overall, but counters only see
    // the two classified machines.
    assert!(!summary.overall_success());
    assert_eq!(summary.machines_processed, 3);
    assert_eq!(summary.successful_updates, 1);
    assert_eq!(summary.failed_updates, 1);
    assert_eq!(summary.failures, vec!["alpha".to_string()]);

    // bravo's artifacts were discarded, charlie's remain for downstream.
    assert!(!fixture.config.output_root.join("bravo").exists());
    assert!(fixture.config.output_root.join("charlie").is_dir());

    // Only charlie's evidence was uploaded.
    assert_eq!(
        fixture.store.keys(),
        vec![
            "charlie/ciDebug.log",
            "charlie/extra.bin",
            "charlie/installSetLogs.log",
        ]
    );

    // charlie's directory is still pending, so the trigger is set.
    assert!(summary.trigger_required);
    assert!(fixture.config.signal_file.exists());
}

#[tokio::test]
async fn successful_update_skips_upload_and_clears_trigger() {
    let fixture = fixture(&["bravo"]);
    let orchestrator = build_orchestrator(&fixture, &[], &[], &[], &["bravo"]);

    let summary = orchestrator.run().await.unwrap();

    assert!(summary.overall_success());
    assert_eq!(summary.successful_updates, 1);
    assert_eq!(summary.failed_updates, 0);
    assert!(fixture.store.keys().is_empty());
    assert!(!summary.trigger_required);
    assert!(!fixture.config.signal_file.exists());
}

#[tokio::test]
async fn extract_failure_lands_in_the_failure_list() {
    let fixture = fixture(&["echo"]);
    let orchestrator = build_orchestrator(&fixture, &[], &["echo"], &[], &[]);

    let summary = orchestrator.run().await.unwrap();

    // Extraction failed before classification, so no update is counted
    // and nothing reaches the store.
    assert!(!summary.overall_success());
    assert_eq!(summary.failures, vec!["echo".to_string()]);
    assert_eq!(summary.successful_updates, 0);
    assert_eq!(summary.failed_updates, 0);
    assert!(fixture.store.keys().is_empty());

    // No output directory was ever created, so the trigger stays clear.
    assert!(!summary.trigger_required);
    assert!(!fixture.config.signal_file.exists());
}

#[tokio::test]
async fn failed_upload_marks_the_run_failed() {
    let mut fixture = fixture(&["charlie"]);
    fixture.store.fail_puts = true;
    let orchestrator = build_orchestrator(&fixture, &[], &[], &[], &[]);

    let summary = orchestrator.run().await.unwrap();

    // The update failure is still counted, and the lost evidence shows up
    // as a pipeline-level failure tagged with the step that broke.
    assert!(!summary.overall_success());
    assert_eq!(summary.failed_updates, 1);
    assert_eq!(summary.failures, vec!["charlie (upload)".to_string()]);
    assert!(fixture.store.keys().is_empty());

    // The artifacts stay on disk for a retry, so the trigger is set.
    assert!(fixture.config.output_root.join("charlie").is_dir());
    assert!(summary.trigger_required);
    assert!(fixture.config.signal_file.exists());
}

#[tokio::test]
async fn empty_output_root_clears_trigger_despite_failures() {
    // Extraction reports success but never creates the output directory, so
    // classification sees missing evidence: the update counts as failed and
    // no upload happens. The output root ends the run empty, which clears
    // the trigger even though a failure was recorded.
    let fixture = fixture(&["delta"]);
    let orchestrator = build_orchestrator(&fixture, &[], &[], &["delta"], &[]);

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.failed_updates, 1);
    assert!(fixture.store.keys().is_empty());
    assert!(!summary.trigger_required);
    assert!(!fixture.config.signal_file.exists());
    // Missing evidence is an update failure, not a pipeline failure.
    assert!(summary.overall_success());
}

#[tokio::test]
async fn zero_machines_is_trivially_successful() {
    let fixture = fixture(&[]);
    let orchestrator = build_orchestrator(&fixture, &[], &[], &[], &[]);

    let summary = orchestrator.run().await.unwrap();

    assert!(summary.overall_success());
    assert_eq!(summary.machines_processed, 0);
    assert!(!summary.trigger_required);
}

#[tokio::test]
async fn stale_trigger_from_previous_run_is_cleared() {
    let fixture = fixture(&["bravo"]);
    fs::write(&fixture.config.signal_file, "").unwrap();
    let orchestrator = build_orchestrator(&fixture, &[], &[], &[], &["bravo"]);

    let summary = orchestrator.run().await.unwrap();

    assert!(!summary.trigger_required);
    assert!(!fixture.config.signal_file.exists());
}

#[tokio::test]
async fn residual_scratch_dirs_are_cleaned_before_the_run() {
    let fixture = fixture(&["bravo"]);
    let scratch = fixture
        .config
        .source_root
        .join("bravo")
        .join("required_files");
    fs::create_dir_all(scratch.join("nested")).unwrap();
    fs::write(scratch.join("nested/left-over.bin"), "stale").unwrap();

    let orchestrator = build_orchestrator(&fixture, &[], &[], &[], &["bravo"]);
    orchestrator.run().await.unwrap();

    assert!(!scratch.exists());
}
