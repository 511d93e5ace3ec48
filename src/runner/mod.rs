//! Harness runner for agent benchmarking.
//!
//! This module runs every configured agent on the bug-hunting prompt and
//! scores what each one reports against the scanned ground truth.
//!
//! # Architecture
//!
//! ```text
//! Codebase → BugScanner → known bugs ─┐
//!                                     ├→ evaluation → Report
//! Prompt → AgentAdapter(s) → results ─┘
//! ```
//!
//! The harness:
//! 1. Scans the codebase once; the bug list is fixed for the run
//! 2. Invokes each agent under a wall-clock timeout, isolating failures
//! 3. Evaluates every result, failed ones included, into an `EvaluationResult`
//! 4. Assembles and saves the report
//!
//! # Example
//!
//! ```ignore
//! use bugbench::runner::{agents, Harness, HarnessConfig};
//!
//! let config = HarnessConfig::load(None)?.with_codebase("./test_codebase");
//! let roster = agents::build_roster(&config.agents, None, None, |k| std::env::var(k).ok())?;
//!
//! let mut harness = Harness::new(config, roster)?;
//! let report = harness.run().await?;
//! harness.save(&report)?;
//!
//! println!("{}", report.render_summary());
//! ```

pub mod agents;
pub mod config;
pub mod harness;
pub mod result;

pub use agents::{AgentAdapter, AgentError, AgentKind, AgentSpec};
pub use config::HarnessConfig;
pub use harness::{Harness, RunPhase};
pub use result::{AgentResult, AgentStatus};
