//! Command-line interface for formseed.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
