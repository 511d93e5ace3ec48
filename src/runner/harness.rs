//! Harness orchestrator.
//!
//! A run moves through `Init → Scanned → Invoking → Aggregated → Saved`.
//! The ground truth is scanned once and stays fixed while agents run. Every
//! agent ends in exactly one [`AgentResult`]: an adapter error, a panic or an
//! expired timeout is recorded for that agent and the run carries on.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::agents::AgentAdapter;
use super::config::HarnessConfig;
use super::result::AgentResult;
use crate::error::{ConfigError, ReportError, ScanError};
use crate::evaluation::{evaluate_response, failed_evaluation, ClaimMatcher, EvaluationResult, RunStats};
use crate::report::{Keyed, Report};
use crate::scanner::{BugRecord, BugScanner, ScanOutcome};

/// Lifecycle of a harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Scanned,
    Invoking,
    Aggregated,
    Saved,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Init => write!(f, "init"),
            RunPhase::Scanned => write!(f, "scanned"),
            RunPhase::Invoking => write!(f, "invoking"),
            RunPhase::Aggregated => write!(f, "aggregated"),
            RunPhase::Saved => write!(f, "saved"),
        }
    }
}

/// Runs a roster of agents against one codebase.
pub struct Harness {
    config: HarnessConfig,
    scanner: BugScanner,
    matcher: ClaimMatcher,
    agents: Vec<Arc<dyn AgentAdapter>>,
    phase: RunPhase,
    stats: RunStats,
}

impl Harness {
    /// Creates a harness. Agents are invoked and reported in the given order.
    pub fn new(config: HarnessConfig, agents: Vec<Arc<dyn AgentAdapter>>) -> Result<Self, ConfigError> {
        let scanner = config.scanner().map_err(|e| ConfigError::InvalidValue {
            key: "bug_pattern".to_string(),
            message: e.to_string(),
        })?;
        let matcher = config.matcher()?;

        Ok(Self {
            config,
            scanner,
            matcher,
            agents,
            phase: RunPhase::Init,
            stats: RunStats::default(),
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Counters for the current run.
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// The configuration this harness runs with.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn advance(&mut self, next: RunPhase) {
        info!(from = %self.phase, to = %next, "Harness phase transition");
        self.phase = next;
    }

    /// Scans the codebase for the ground-truth bug list.
    pub fn scan(&mut self) -> Result<ScanOutcome, ScanError> {
        let outcome = self.scanner.scan(&self.config.codebase_path)?;
        self.stats.files_scanned = outcome.files_scanned;
        self.stats.files_skipped = outcome.skipped.len();
        self.advance(RunPhase::Scanned);
        Ok(outcome)
    }

    /// Invokes every agent, at most `parallelism` at a time.
    ///
    /// Results come back in roster order whatever the completion order.
    pub async fn invoke_all(&mut self) -> Vec<AgentResult> {
        self.advance(RunPhase::Invoking);

        let prompt: Arc<str> = Arc::from(self.config.rendered_prompt());
        let timeout = self.config.agent_timeout();
        let mut results = Vec::with_capacity(self.agents.len());

        info!(
            agents = self.agents.len(),
            parallelism = self.config.parallelism,
            "Invoking agents"
        );

        for chunk in self.agents.chunks(self.config.parallelism.max(1)) {
            let started = Instant::now();
            let handles = chunk.iter().map(|adapter| {
                let adapter = Arc::clone(adapter);
                let prompt = Arc::clone(&prompt);
                tokio::spawn(async move { invoke_agent(adapter, &prompt, timeout).await })
            });
            let joined = futures::future::join_all(handles).await;

            for (adapter, joined) in chunk.iter().zip(joined) {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        error!(agent = %adapter.id(), error = %e, "Agent task panicked");
                        results.push(AgentResult::failure(
                            adapter.id(),
                            format!("Agent task panicked: {e}"),
                            started.elapsed(),
                        ));
                    }
                }
            }
        }

        results
    }

    /// Scores every result, failed ones included, against `known_bugs`.
    pub fn evaluate(
        &mut self,
        known_bugs: &[BugRecord],
        results: &[AgentResult],
    ) -> Keyed<EvaluationResult> {
        let evaluation = results
            .iter()
            .map(|result| {
                let evaluation = match (&result.response, &result.error) {
                    (Some(response), None) => {
                        evaluate_response(response, known_bugs, &self.matcher, &mut self.stats)
                    }
                    (_, error) => failed_evaluation(
                        known_bugs.len(),
                        error.clone().unwrap_or_else(|| "Agent returned no response".to_string()),
                    ),
                };
                (result.agent_id.clone(), evaluation)
            })
            .collect();
        self.advance(RunPhase::Aggregated);
        evaluation
    }

    /// Runs the whole pipeline up to, but not including, saving.
    ///
    /// Only a scan failure aborts the run; agent failures are recorded in
    /// the report.
    pub async fn run(&mut self) -> Result<Report, ScanError> {
        self.stats = RunStats::default();

        let outcome = self.scan()?;
        info!(
            bugs = outcome.bugs.len(),
            files = outcome.files_scanned,
            "Ground truth fixed for this run"
        );

        let results = self.invoke_all().await;
        let evaluation = self.evaluate(&outcome.bugs, &results);

        let mut report = Report::new(self.config.codebase_path.clone(), outcome.bugs);
        report.agent_results = results
            .into_iter()
            .map(|r| (r.agent_id.clone(), r))
            .collect();
        report.evaluation = evaluation;
        report.stats = self.stats;
        report.skipped_files = outcome.skipped;
        Ok(report)
    }

    /// Writes `report` to the configured output path.
    pub fn save(&mut self, report: &Report) -> Result<(), ReportError> {
        report.save(&self.config.output_path)?;
        self.advance(RunPhase::Saved);
        Ok(())
    }
}

/// Runs one agent under `timeout`.
///
/// On expiry the adapter's future is dropped, which releases whatever it
/// holds (command adapters kill their child process).
pub async fn invoke_agent(
    adapter: Arc<dyn AgentAdapter>,
    prompt: &str,
    timeout: Duration,
) -> AgentResult {
    let id = adapter.id().to_string();
    let start = Instant::now();
    info!(agent = %id, "Agent invoked");

    match tokio::time::timeout(timeout, adapter.run(prompt)).await {
        Ok(Ok(response)) => {
            info!(agent = %id, elapsed_ms = start.elapsed().as_millis() as u64, "Agent succeeded");
            AgentResult::success(id, response, start.elapsed())
        }
        Ok(Err(e)) => {
            warn!(agent = %id, error = %e, "Agent failed");
            AgentResult::from_error(id, &e, start.elapsed())
        }
        Err(_) => {
            warn!(agent = %id, timeout_secs = timeout.as_secs_f64(), "Agent timed out");
            AgentResult::timed_out(id, start.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::agents::AgentError;
    use crate::runner::result::{AgentStatus, TIMEOUT_MESSAGE};
    use async_trait::async_trait;
    use tempfile::TempDir;

    enum Behavior {
        Respond(&'static str),
        Fail,
        Hang,
        Panic,
    }

    struct FakeAgent {
        id: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl AgentAdapter for FakeAgent {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(&self, _prompt: &str) -> Result<String, AgentError> {
            match &self.behavior {
                Behavior::Respond(text) => Ok(text.to_string()),
                Behavior::Fail => Err(AgentError::ExecutionFailed("import error".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(String::new())
                }
                Behavior::Panic => panic!("adapter bug"),
            }
        }
    }

    fn fake(id: &'static str, behavior: Behavior) -> Arc<dyn AgentAdapter> {
        Arc::new(FakeAgent { id, behavior })
    }

    fn codebase() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cache.py"),
            "class Cache:\n    pass\n    # BUG: LRU order never updated on access\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("utils.py"),
            "def avg(xs):\n    # BUG: division by zero when list is empty\n    return sum(xs) / len(xs)\n",
        )
        .unwrap();
        dir
    }

    fn config(dir: &TempDir) -> HarnessConfig {
        HarnessConfig::default()
            .with_codebase(dir.path())
            .with_output(dir.path().join("out").join("results.json"))
            .with_timeout_secs(1)
    }

    #[tokio::test]
    async fn test_invoke_agent_timeout_is_distinct() {
        let result = invoke_agent(fake("slow", Behavior::Hang), "prompt", Duration::from_millis(50)).await;
        assert_eq!(result.status, AgentStatus::TimedOut);
        assert_eq!(result.error.as_deref(), Some(TIMEOUT_MESSAGE));

        let result = invoke_agent(fake("broken", Behavior::Fail), "prompt", Duration::from_secs(1)).await;
        assert_eq!(result.status, AgentStatus::Failed);
        assert!(result.error.unwrap().contains("import error"));
    }

    #[tokio::test]
    async fn test_run_isolates_failures() {
        let dir = codebase();
        let agents = vec![
            fake("panicky", Behavior::Panic),
            fake("good", Behavior::Respond("1. cache.py line 3: the LRU order bug\n\n2. utils.py:2 division by zero")),
            fake("broken", Behavior::Fail),
        ];
        let mut harness = Harness::new(config(&dir), agents).unwrap();
        assert_eq!(harness.phase(), RunPhase::Init);

        let report = harness.run().await.unwrap();
        assert_eq!(harness.phase(), RunPhase::Aggregated);
        assert_eq!(report.known_bugs.len(), 2);
        assert_eq!(
            report.agent_results.ids().collect::<Vec<_>>(),
            vec!["panicky", "good", "broken"]
        );

        let panicky = report.agent_results.get("panicky").unwrap();
        assert_eq!(panicky.status, AgentStatus::Failed);
        assert!(panicky.error.as_deref().unwrap().contains("panicked"));

        let good = report.evaluation.get("good").unwrap();
        assert_eq!(good.unique_bugs_found, 2);
        assert_eq!(good.recall, 1.0);

        let broken = report.evaluation.get("broken").unwrap();
        assert_eq!(broken.recall, 0.0);
        assert!(broken.error.is_some());

        assert_eq!(report.stats.files_scanned, 2);
        assert_eq!(report.stats.responses_evaluated, 1);

        harness.save(&report).unwrap();
        assert_eq!(harness.phase(), RunPhase::Saved);
        assert!(dir.path().join("out").join("results.json").is_file());
    }

    #[tokio::test]
    async fn test_parallel_run_keeps_roster_order() {
        let dir = codebase();
        let agents = vec![
            fake("slow", Behavior::Hang),
            fake("a", Behavior::Respond("nothing to report")),
            fake("b", Behavior::Respond("1. Bug at utils.py line 2")),
        ];
        let mut harness = Harness::new(config(&dir).with_parallelism(3), agents).unwrap();

        let started = Instant::now();
        let report = harness.run().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));

        assert_eq!(report.agent_results.ids().collect::<Vec<_>>(), vec!["slow", "a", "b"]);
        assert_eq!(
            report.agent_results.get("slow").unwrap().status,
            AgentStatus::TimedOut
        );
        let ranking: Vec<&str> = report.ranking().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ranking, vec!["b", "slow", "a"]);
    }

    #[tokio::test]
    async fn test_run_fails_on_missing_codebase() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::default().with_codebase(dir.path().join("absent"));
        let mut harness = Harness::new(config, Vec::new()).unwrap();
        assert!(matches!(harness.run().await, Err(ScanError::RootNotFound(_))));
        assert_eq!(harness.phase(), RunPhase::Init);
    }
}
