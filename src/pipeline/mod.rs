//! Per-machine pipeline and run orchestration.

pub mod classify;
pub mod machine;
pub mod orchestrator;
pub mod tasks;

pub use classify::{
    ClassifyError, CommandClassifier, UpdateCheck, UpdateClassifier, UpdateStatus, DEBUG_LOG,
    INSTALL_SET_LOG,
};
pub use machine::{discover_machines, Machine, MachinePipeline, PipelineOutcome, UploadOutcome};
pub use orchestrator::{Orchestrator, PipelineError, RunSummary};
pub use tasks::{CommandExtractor, CommandPreparer, LogExtractor, MachinePreparer, TaskError};
