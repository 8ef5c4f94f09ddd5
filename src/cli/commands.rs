//! CLI command definitions and production wiring.
//!
//! Connection parameters come from the environment (see
//! `PipelineConfig::from_env`); the CLI only overrides paths and prints the
//! run summary. Exit status is 0 iff the run had no pipeline-level failures.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::PipelineConfig;
use crate::pipeline::{
    CommandClassifier, CommandExtractor, CommandPreparer, MachinePipeline, Orchestrator,
};
use crate::storage::{MachineUploader, S3ObjectStore};

/// Batch triage of machine update logs.
#[derive(Parser)]
#[command(name = "logtriage")]
#[command(about = "Extract machine update logs, classify outcomes and upload failure evidence")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline once over all machines.
    Run(RunArgs),
}

/// Arguments for `logtriage run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Root directory containing one subdirectory per machine.
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Root directory for extracted artifacts (recreated each run).
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Destination bucket for failure evidence.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command. The returned exit code is 0 only when the
/// run completed without pipeline-level failures.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<std::process::ExitCode> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<std::process::ExitCode> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(source_root) = args.source_root {
        config.source_root = source_root;
    }
    if let Some(output_root) = args.output_root {
        config.output_root = output_root;
    }
    if let Some(bucket) = args.bucket {
        config.bucket = bucket;
    }
    config.validate()?;

    info!(
        source_root = %config.source_root.display(),
        output_root = %config.output_root.display(),
        bucket = %config.bucket,
        "starting log triage run"
    );

    let store = S3ObjectStore::connect(&config.store).await;
    let uploader = MachineUploader::new(store, config.bucket.clone(), config.retry_policy());
    let pipeline = MachinePipeline::new(
        Box::new(CommandPreparer::new(config.prepare_command.clone())),
        Box::new(CommandExtractor::new(config.extract_command.clone())),
        Box::new(CommandClassifier::new(config.classify_command.clone())),
        uploader,
        config.source_root.clone(),
        config.output_root.clone(),
    );

    let orchestrator = Orchestrator::new(config, pipeline);
    let summary = orchestrator.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if summary.overall_success() {
        Ok(std::process::ExitCode::SUCCESS)
    } else {
        Ok(std::process::ExitCode::FAILURE)
    }
}
