//! Outcome of a single agent invocation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::agents::AgentError;

/// Error text recorded when an agent exceeds its timeout.
pub const TIMEOUT_MESSAGE: &str = "Process timed out";

/// Terminal status of an agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Succeeded => write!(f, "succeeded"),
            AgentStatus::Failed => write!(f, "failed"),
            AgentStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// What one agent returned, or why it did not.
///
/// Exactly one of `response` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub success: bool,
    pub status: AgentStatus,
    pub response: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AgentResult {
    /// Creates a successful result holding the agent's response.
    pub fn success(agent_id: impl Into<String>, response: impl Into<String>, duration: Duration) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: true,
            status: AgentStatus::Succeeded,
            response: Some(response.into()),
            error: None,
            duration_ms: millis(duration),
        }
    }

    /// Creates a failed result with an error message.
    pub fn failure(agent_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: false,
            status: AgentStatus::Failed,
            response: None,
            error: Some(error.into()),
            duration_ms: millis(duration),
        }
    }

    /// Creates a timed-out result.
    pub fn timed_out(agent_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: AgentStatus::TimedOut,
            ..Self::failure(agent_id, TIMEOUT_MESSAGE, duration)
        }
    }

    /// Maps an adapter error to a failed or timed-out result.
    pub fn from_error(agent_id: impl Into<String>, error: &AgentError, duration: Duration) -> Self {
        if error.is_timeout() {
            Self::timed_out(agent_id, duration)
        } else {
            Self::failure(agent_id, error.to_string(), duration)
        }
    }

    /// Wall-clock time the invocation took.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
