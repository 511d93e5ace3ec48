//! Harness configuration.
//!
//! Values are layered from lowest to highest priority: built-in defaults, a
//! YAML file, `BUGBENCH_*` environment variables and finally CLI flags, which
//! the command layer applies through the `with_*` builders.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::agents::AgentSpec;
use crate::error::{ConfigError, ScanError};
use crate::evaluation::ClaimMatcher;
use crate::scanner::{BugScanner, DEFAULT_BUG_PATTERN, DEFAULT_IGNORED_DIRS};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "bugbench.yaml";

/// Placeholder in the prompt replaced by the codebase path.
pub const CODEBASE_PLACEHOLDER: &str = "{codebase}";

pub const DEFAULT_PROMPT: &str = "You are a code analysis assistant that specializes in finding bugs in code.
Analyze the {codebase} directory and identify all bugs marked with '# BUG:' comments.

For each bug you find:
1. Give the file and line number where it is located
2. Explain clearly what is wrong
3. Suggest a specific fix

Present your findings as a numbered list.";

pub const ENV_CODEBASE: &str = "BUGBENCH_CODEBASE";
pub const ENV_OUTPUT: &str = "BUGBENCH_OUTPUT";
pub const ENV_TIMEOUT_SECS: &str = "BUGBENCH_TIMEOUT_SECS";
pub const ENV_PARALLELISM: &str = "BUGBENCH_PARALLELISM";

/// Configuration for one harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root directory scanned for sentinel comments.
    pub codebase_path: PathBuf,
    /// File-name extensions to scan, without the dot.
    pub extensions: Vec<String>,
    /// Sentinel regex. Capture group 1 is the bug description.
    pub bug_pattern: String,
    /// Directory names never descended into.
    pub ignored_dirs: Vec<String>,
    /// Prompt sent to every agent.
    pub prompt: String,
    /// Wall-clock limit per agent, in seconds.
    pub agent_timeout_secs: u64,
    /// Maximum concurrent agent invocations. 1 runs agents sequentially.
    pub parallelism: usize,
    /// Where the report is written.
    pub output_path: PathBuf,
    /// Agents to benchmark, in report order.
    pub agents: Vec<AgentSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            codebase_path: PathBuf::from("test_codebase"),
            extensions: vec!["py".to_string()],
            bug_pattern: DEFAULT_BUG_PATTERN.to_string(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|d| d.to_string()).collect(),
            prompt: DEFAULT_PROMPT.to_string(),
            agent_timeout_secs: 300,
            parallelism: 1,
            output_path: PathBuf::from("agent_evaluation_results.json"),
            agents: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a YAML config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parses YAML config text. Empty text yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads defaults, then `path` (or [`DEFAULT_CONFIG_FILE`] if it exists),
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading config file");
                Self::from_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                debug!(path = DEFAULT_CONFIG_FILE, "Loading config file from working directory");
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `BUGBENCH_*` overrides looked up through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_CODEBASE) {
            self.codebase_path = PathBuf::from(val);
        }
        if let Some(val) = lookup(ENV_OUTPUT) {
            self.output_path = PathBuf::from(val);
        }
        if let Some(val) = lookup(ENV_TIMEOUT_SECS) {
            self.agent_timeout_secs = parse_env_value(&val, ENV_TIMEOUT_SECS)?;
        }
        if let Some(val) = lookup(ENV_PARALLELISM) {
            self.parallelism = parse_env_value(&val, ENV_PARALLELISM)?;
        }
        Ok(())
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_timeout_secs == 0 {
            return Err(invalid("agent_timeout_secs", "must be greater than 0"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism", "must be greater than 0"));
        }
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(invalid("extensions", "at least one extension is required"));
        }
        if let Err(e) = Regex::new(&self.bug_pattern) {
            return Err(invalid("bug_pattern", &e.to_string()));
        }
        if !self.codebase_path.is_dir() {
            return Err(ConfigError::MissingCodebase(self.codebase_path.clone()));
        }
        Ok(())
    }

    /// Sets the codebase to scan.
    pub fn with_codebase(mut self, path: impl Into<PathBuf>) -> Self {
        self.codebase_path = path.into();
        self
    }

    /// Sets the report path.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Sets the per-agent timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.agent_timeout_secs = secs;
        self
    }

    /// Sets how many agents may run at once.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets the prompt template.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Appends an agent to the roster.
    pub fn with_agent(mut self, agent: AgentSpec) -> Self {
        self.agents.push(agent);
        self
    }

    /// Per-agent timeout as a [`Duration`].
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// The prompt with [`CODEBASE_PLACEHOLDER`] substituted.
    pub fn rendered_prompt(&self) -> String {
        self.prompt
            .replace(CODEBASE_PLACEHOLDER, &self.codebase_path.display().to_string())
    }

    /// Scanner configured with this pattern, extensions and ignore list.
    pub fn scanner(&self) -> Result<BugScanner, ScanError> {
        Ok(BugScanner::new(&self.bug_pattern)?
            .with_extensions(&self.extensions)
            .with_ignored_dirs(self.ignored_dirs.iter().cloned()))
    }

    /// Claim matcher recognising this configuration's file extensions.
    pub fn matcher(&self) -> Result<ClaimMatcher, ConfigError> {
        ClaimMatcher::new(&self.extensions).map_err(|e| invalid("extensions", &e.to_string()))
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
