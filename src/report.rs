//! Persisted evaluation report and the ranked console summary.

use std::fmt::{self, Write as _};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;
use uuid::Uuid;

use crate::error::ReportError;
use crate::evaluation::{rank, EvaluationResult, RunStats};
use crate::runner::AgentResult;
use crate::scanner::{BugRecord, SkippedFile};

/// Entries keyed by agent id, serialized as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T>(Vec<(String, T)>);

impl<T> Keyed<T> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an entry. Callers keep ids unique.
    pub fn insert(&mut self, id: impl Into<String>, value: T) {
        self.0.push((id.into(), value));
    }

    /// Returns the first value stored for `id`.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[(String, T)] {
        &self.0
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for Keyed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(String, T)> for Keyed<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for Keyed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Keyed<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for KeyedVisitor<T> {
            type Value = Keyed<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map keyed by agent id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Keyed<T>, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(Keyed(entries))
            }
        }

        deserializer.deserialize_map(KeyedVisitor(PhantomData))
    }
}

/// Everything one harness run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub codebase: PathBuf,
    pub known_bugs: Vec<BugRecord>,
    pub agent_results: Keyed<AgentResult>,
    pub evaluation: Keyed<EvaluationResult>,
    pub stats: RunStats,
    #[serde(default)]
    pub skipped_files: Vec<SkippedFile>,
}

impl Report {
    /// Creates an empty report for `codebase` with a fresh run id.
    pub fn new(codebase: impl Into<PathBuf>, known_bugs: Vec<BugRecord>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            codebase: codebase.into(),
            known_bugs,
            agent_results: Keyed::new(),
            evaluation: Keyed::new(),
            stats: RunStats::default(),
            skipped_files: Vec::new(),
        }
    }

    /// Evaluations ordered by recall, highest first; ties keep roster order.
    pub fn ranking(&self) -> Vec<&(String, EvaluationResult)> {
        rank(self.evaluation.entries())
    }

    /// Writes the report as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;

        let write_err = |source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, json).map_err(write_err)?;

        info!(path = %path.display(), agents = self.evaluation.len(), "Saved evaluation report");
        Ok(())
    }

    /// Human-readable ranked summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== AGENT EVALUATION SUMMARY ===");
        let _ = writeln!(out, "Total bugs in codebase: {}", self.known_bugs.len());
        let _ = writeln!(out, "\nPerformance by agent:");

        for (agent, result) in self.ranking() {
            let _ = writeln!(out, "\n{agent}:");
            let _ = writeln!(
                out,
                "  Unique bugs found: {} / {}",
                result.unique_bugs_found, result.total_known_bugs
            );
            let _ = writeln!(out, "  Recall: {:.2}%", result.recall * 100.0);
            let _ = writeln!(out, "  Total matched bugs: {}", result.bugs_found);
            let _ = writeln!(out, "  Unmatched claims: {}", result.unmatched_claim_count);
            if let Some(error) = &result.error {
                let _ = writeln!(out, "  Error: {error}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{aggregate, failed_evaluation, Claim, MatchKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_report() -> Report {
        let bugs = vec![
            BugRecord {
                file: "cache.py".to_string(),
                line: 24,
                description: "LRU order not maintained".to_string(),
            },
            BugRecord {
                file: "utils.py".to_string(),
                line: 10,
                description: "division by zero".to_string(),
            },
        ];
        let mut report = Report::new("test_codebase", bugs);

        report.agent_results.insert(
            "smolagents",
            AgentResult::success("smolagents", "1. cache.py:24 bug", Duration::from_millis(10)),
        );
        report.evaluation.insert(
            "smolagents",
            aggregate(vec![Claim::matched("1. cache.py:24 bug", 0, MatchKind::LineNumber)], 2),
        );
        report.agent_results.insert(
            "autogen",
            AgentResult::timed_out("autogen", Duration::from_secs(300)),
        );
        report
            .evaluation
            .insert("autogen", failed_evaluation(2, "Process timed out"));
        report
    }

    #[test]
    fn test_keyed_preserves_insertion_order() {
        let keyed: Keyed<u32> = vec![("zeta".to_string(), 1), ("alpha".to_string(), 2)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&keyed).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":2}"#);

        let back: Keyed<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ids().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(back.get("alpha"), Some(&2));
    }

    #[test]
    fn test_report_json_shape() {
        let report = sample_report();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["known_bugs"].as_array().unwrap().len(), 2);
        assert_eq!(json["agent_results"]["autogen"]["status"], "timed_out");
        assert_eq!(json["agent_results"]["autogen"]["error"], "Process timed out");
        assert_eq!(json["evaluation"]["smolagents"]["recall"], 0.5);
        assert_eq!(json["evaluation"]["smolagents"]["matched_bug_indices"], serde_json::json!([0]));
        assert_eq!(json["evaluation"]["autogen"]["recall"], 0.0);
        assert!(json["run_id"].is_string());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.json");
        let report = sample_report();

        report.save(&path).unwrap();

        let saved: Report = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.run_id, report.run_id);
        assert_eq!(
            saved.evaluation.ids().collect::<Vec<_>>(),
            vec!["smolagents", "autogen"]
        );
    }

    #[test]
    fn test_save_error_is_propagated() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = sample_report().save(&blocker.join("results.json")).unwrap_err();
        assert!(matches!(err, ReportError::Write { .. }));
    }

    #[test]
    fn test_render_summary_is_ranked() {
        let summary = sample_report().render_summary();
        assert!(summary.contains("Total bugs in codebase: 2"));
        assert!(summary.contains("  Recall: 50.00%"));
        assert!(summary.contains("  Error: Process timed out"));

        let smol = summary.find("smolagents:").unwrap();
        let autogen = summary.find("autogen:").unwrap();
        assert!(smol < autogen);
    }
}
