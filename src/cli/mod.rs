//! Command-line interface for cli-rl-env.
//!
//! Provides commands for building scenarios, checking command strings
//! against the whitelist and running single-step episodes.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
