//! Command agent adapter.
//!
//! Runs a local program, writes the prompt to its stdin and takes its stdout
//! as the response.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{AgentAdapter, AgentError};

/// Maximum number of characters of stderr carried in an error.
const STDERR_SUMMARY_CHARS: usize = 2000;

/// Adapter for any CLI agent that reads a prompt on stdin.
pub struct CommandAdapter {
    id: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandAdapter {
    pub fn new(id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

#[async_trait]
impl AgentAdapter for CommandAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The harness enforces timeouts by dropping this future.
            .kill_on_drop(true);

        info!(agent = %self.id, program = %self.program, "Starting command agent");

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AgentError::NotFound(self.program.clone()),
            _ => AgentError::ExecutionFailed(format!("Failed to spawn {}: {}", self.program, e)),
        })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|e| AgentError::ExecutionFailed(format!("Process error: {}", e)))?;

        // A program may exit without reading its input; only its exit status matters then.
        if let Err(e) = fed {
            debug!(agent = %self.id, error = %e, "Prompt was not fully consumed");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: truncate_chars(stderr.trim(), STDERR_SUMMARY_CHARS),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(agent = %self.id, bytes = stdout.len(), "Command agent completed");
        Ok(stdout)
    }
}

/// Truncates to at most `max_chars` characters, marking the cut.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}... [truncated]", &s[..cut]),
    }
}
