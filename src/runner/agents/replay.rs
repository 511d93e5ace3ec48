//! Replay agent adapter.
//!
//! Returns a previously recorded response, which makes scoring reproducible
//! and lets a roster mix live and offline agents.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{AgentAdapter, AgentError};

pub struct ReplayAdapter {
    id: String,
    path: PathBuf,
}

impl ReplayAdapter {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl AgentAdapter for ReplayAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, _prompt: &str) -> Result<String, AgentError> {
        debug!(agent = %self.id, path = %self.path.display(), "Replaying recorded response");
        tokio::fs::read_to_string(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AgentError::NotFound(format!("recorded response {}", self.path.display()))
            }
            _ => AgentError::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replays_file_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recorded.txt");
        std::fs::write(&path, "1. cache.py:24 - LRU bug").unwrap();

        let adapter = ReplayAdapter::new("recorded", &path);
        assert_eq!(adapter.run("ignored").await.unwrap(), "1. cache.py:24 - LRU bug");
    }

    #[tokio::test]
    async fn test_missing_recording() {
        let dir = TempDir::new().unwrap();
        let adapter = ReplayAdapter::new("recorded", dir.path().join("absent.txt"));
        assert!(matches!(
            adapter.run("ignored").await,
            Err(AgentError::NotFound(_))
        ));
    }
}
