//! Error types for bugbench operations.
//!
//! Defines error types for the major subsystems:
//! - Codebase scanning for sentinel-marked bugs
//! - Harness configuration and agent roster validation
//! - Report serialization and persistence
//!
//! Agent invocation errors live next to the adapters in
//! [`crate::runner::agents::AgentError`] because they never escape a run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while scanning a codebase for bug sentinels.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Codebase path does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Codebase path is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("Invalid bug pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Failed to walk codebase: {0}")]
    Walk(String),
}

/// Errors that can occur while building or validating harness configuration.
///
/// All of these are fatal and are reported before any agent is invoked.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Codebase path does not exist: {0}")]
    MissingCodebase(PathBuf),

    #[error("Missing credentials for agent '{agent}': set {env_var} or pass --api-key")]
    MissingCredentials { agent: String, env_var: String },

    #[error("Unknown agent '{requested}'. Available agents: {available}")]
    UnknownAgent { requested: String, available: String },

    #[error("No agents configured; add an `agents` section to the config file")]
    NoAgents,

    #[error("Duplicate agent id '{0}' in roster")]
    DuplicateAgent(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while persisting an evaluation report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::MissingCredentials {
            agent: "langchain".to_string(),
            env_var: "OPENAI_API_KEY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing credentials for agent 'langchain': set OPENAI_API_KEY or pass --api-key"
        );

        let err = ConfigError::UnknownAgent {
            requested: "nope".to_string(),
            available: "a, b".to_string(),
        };
        assert!(err.to_string().contains("Available agents: a, b"));
    }

    #[test]
    fn test_scan_error_from_regex() {
        let err: ScanError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, ScanError::InvalidPattern(_)));
    }
}
