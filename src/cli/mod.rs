//! Command-line interface for logtriage.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
