//! Agent adapters for the back-ends under benchmark.
//!
//! Every adapter exposes the same black-box contract: a prompt goes in, a
//! free-text response comes out, and any failure is returned as an
//! [`AgentError`] rather than a panic. The harness owns timeouts; adapters
//! must release their resources when their future is dropped.

pub mod chat;
pub mod command;
pub mod replay;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use chat::ChatAdapter;
pub use command::CommandAdapter;
pub use replay::ReplayAdapter;

/// Default environment variable holding chat API credentials.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Trait for agent adapters.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Normalised agent id, used as the report key.
    fn id(&self) -> &str;

    /// Runs the agent on `prompt` and returns its response text.
    async fn run(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Error type for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Agent exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed agent response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout(_))
    }
}

/// One roster entry from the harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: AgentKind,
}

/// How an agent is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentKind {
    /// A local process reading the prompt on stdin and answering on stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// An OpenAI-compatible chat completions endpoint.
    Chat {
        model: String,
        #[serde(default = "default_api_base")]
        api_base: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default)]
        temperature: Option<f64>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        system_prompt: Option<String>,
    },
    /// A previously recorded response.
    Replay { path: PathBuf },
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

impl AgentSpec {
    pub fn command(id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: AgentKind::Command {
                program: program.into(),
                args: Vec::new(),
                env: BTreeMap::new(),
            },
        }
    }

    pub fn chat(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: AgentKind::Chat {
                model: model.into(),
                api_base: default_api_base(),
                api_key_env: default_api_key_env(),
                temperature: None,
                max_tokens: None,
                system_prompt: None,
            },
        }
    }

    pub fn replay(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind: AgentKind::Replay { path: path.into() },
        }
    }

    /// The id after [`normalize_agent_id`].
    pub fn normalized_id(&self) -> String {
        normalize_agent_id(&self.id)
    }
}

/// Normalises an agent name: lower-case, without a `.py` file suffix or an
/// `_example` script suffix, so `LangChain_example.py` becomes `langchain`.
pub fn normalize_agent_id(raw: &str) -> String {
    let name = raw.trim().to_lowercase();
    let name = name.rsplit(['/', '\\']).next().unwrap_or(&name);
    let name = name.strip_suffix(".py").unwrap_or(name);
    let name = name.strip_suffix("_example").unwrap_or(name);
    name.to_string()
}

/// Builds adapters for a roster.
///
/// `only` restricts the roster to one agent. Credentials for chat agents are
/// resolved from `api_key_override` or the agent's environment variable via
/// `lookup_env`; missing credentials fail the whole roster.
pub fn build_roster<F>(
    specs: &[AgentSpec],
    only: Option<&str>,
    api_key_override: Option<&str>,
    lookup_env: F,
) -> Result<Vec<Arc<dyn AgentAdapter>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if specs.is_empty() {
        return Err(ConfigError::NoAgents);
    }

    let mut seen = HashSet::new();
    for spec in specs {
        let id = spec.normalized_id();
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateAgent(id));
        }
    }

    let selected: Vec<&AgentSpec> = match only {
        Some(requested) => {
            let wanted = normalize_agent_id(requested);
            let found: Vec<&AgentSpec> =
                specs.iter().filter(|s| s.normalized_id() == wanted).collect();
            if found.is_empty() {
                return Err(ConfigError::UnknownAgent {
                    requested: requested.to_string(),
                    available: specs
                        .iter()
                        .map(AgentSpec::normalized_id)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
            found
        }
        None => specs.iter().collect(),
    };

    selected
        .into_iter()
        .map(|spec| build_adapter(spec, api_key_override, &lookup_env))
        .collect()
}

/// Creates the adapter for a single roster entry.
pub fn build_adapter<F>(
    spec: &AgentSpec,
    api_key_override: Option<&str>,
    lookup_env: F,
) -> Result<Arc<dyn AgentAdapter>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let id = spec.normalized_id();
    let adapter: Arc<dyn AgentAdapter> = match &spec.kind {
        AgentKind::Command { program, args, env } => Arc::new(
            CommandAdapter::new(id, program)
                .with_args(args.clone())
                .with_env(env.clone()),
        ),
        AgentKind::Chat {
            model,
            api_base,
            api_key_env,
            temperature,
            max_tokens,
            system_prompt,
        } => {
            let api_key = api_key_override
                .map(str::to_string)
                .or_else(|| lookup_env(api_key_env))
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingCredentials {
                    agent: id.clone(),
                    env_var: api_key_env.clone(),
                })?;

            let mut adapter = ChatAdapter::new(id, api_key, model.clone())
                .map_err(|e| ConfigError::InvalidValue {
                    key: format!("agents.{}", spec.id),
                    message: e.to_string(),
                })?
                .with_api_base(api_base.clone());
            if let Some(t) = temperature {
                adapter = adapter.with_temperature(*t);
            }
            if let Some(m) = max_tokens {
                adapter = adapter.with_max_tokens(*m);
            }
            if let Some(p) = system_prompt {
                adapter = adapter.with_system_prompt(p.clone());
            }
            Arc::new(adapter)
        }
        AgentKind::Replay { path } => Arc::new(ReplayAdapter::new(id, path.clone())),
    };
    Ok(adapter)
}
