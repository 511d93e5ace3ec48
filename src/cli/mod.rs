//! Command-line interface for bugbench.
//!
//! Provides the `run` command for benchmarking agents and the `score` command
//! for evaluating a single saved response.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
