//! bugbench: benchmark harness for bug-hunting agents.
//!
//! This library scans a codebase for seeded `# BUG:` sentinel comments, runs
//! agents on a bug-finding prompt, and scores each free-text answer against
//! the scanned ground truth by recall.

pub mod cli;
pub mod error;
pub mod evaluation;
pub mod report;
pub mod runner;
pub mod scanner;

// Re-export commonly used types
pub use error::{ConfigError, ReportError, ScanError};
pub use evaluation::{evaluate_response, Claim, ClaimMatcher, EvaluationResult, MatchKind, RunStats};
pub use report::Report;
pub use runner::{AgentAdapter, AgentError, AgentResult, AgentStatus, Harness, HarnessConfig};
pub use scanner::{BugRecord, BugScanner, ScanOutcome};
