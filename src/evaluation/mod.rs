//! Scoring of free-text agent reports against the ground-truth bug list.
//!
//! # Architecture
//!
//! ```text
//! response ─► segment ─► paragraphs ─► ClaimMatcher ─► claims ─► aggregate ─► EvaluationResult
//!                                          ▲
//!                              known bugs ─┘
//! ```
//!
//! The segmenter turns an unstructured answer into candidate paragraphs, the
//! matcher links each paragraph to at most one known bug, and the aggregator
//! deduplicates matches per bug and computes recall.

pub mod matcher;
pub mod metrics;
pub mod segment;

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::scanner::BugRecord;

pub use matcher::ClaimMatcher;
pub use metrics::{aggregate, failed_evaluation, rank};
pub use segment::segment;

/// Wire value used for claims that match no known bug.
pub const UNMATCHED: &str = "UNMATCHED";

/// How a claim was linked to a known bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Claimed line number equals the bug's line.
    LineNumber,
    /// Claimed file is compatible and a description keyword appears.
    FileAndKeyword,
    /// Enough description keywords appear, regardless of file.
    Keyword,
    /// No known bug could be linked.
    None,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::LineNumber => write!(f, "line_number"),
            MatchKind::FileAndKeyword => write!(f, "file_and_keyword"),
            MatchKind::Keyword => write!(f, "keyword"),
            MatchKind::None => write!(f, "none"),
        }
    }
}

/// Position of the matched bug in the ground truth, or unmatched.
///
/// Serialized as an integer or the string `"UNMATCHED"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BugIndex {
    Known(usize),
    Unmatched,
}

impl BugIndex {
    pub fn known(&self) -> Option<usize> {
        match self {
            BugIndex::Known(index) => Some(*index),
            BugIndex::Unmatched => None,
        }
    }
}

impl Serialize for BugIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BugIndex::Known(index) => serializer.serialize_u64(*index as u64),
            BugIndex::Unmatched => serializer.serialize_str(UNMATCHED),
        }
    }
}

impl<'de> Deserialize<'de> for BugIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BugIndexVisitor;

        impl Visitor<'_> for BugIndexVisitor {
            type Value = BugIndex;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a non-negative bug index or \"{UNMATCHED}\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<BugIndex, E> {
                usize::try_from(v)
                    .map(BugIndex::Known)
                    .map_err(|_| E::custom("bug index out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<BugIndex, E> {
                usize::try_from(v)
                    .map(BugIndex::Known)
                    .map_err(|_| E::custom("bug index must be non-negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BugIndex, E> {
                if v == UNMATCHED {
                    Ok(BugIndex::Unmatched)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(BugIndexVisitor)
    }
}

/// An agent's assertion, after segmentation, and what it was linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub source_text: String,
    pub matched_bug_index: BugIndex,
    pub match_kind: MatchKind,
}

impl Claim {
    /// A claim linked to the bug at `index`.
    ///
    /// `kind` must not be [`MatchKind::None`]; use [`Claim::unmatched`] for that.
    pub fn matched(source_text: impl Into<String>, index: usize, kind: MatchKind) -> Self {
        debug_assert!(kind != MatchKind::None, "matched claim needs a match kind");
        Self {
            source_text: source_text.into(),
            matched_bug_index: BugIndex::Known(index),
            match_kind: kind,
        }
    }

    /// A bug-shaped claim that could not be reconciled with any known bug.
    pub fn unmatched(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            matched_bug_index: BugIndex::Unmatched,
            match_kind: MatchKind::None,
        }
    }

    pub fn bug_index(&self) -> Option<usize> {
        self.matched_bug_index.known()
    }

    pub fn is_matched(&self) -> bool {
        self.bug_index().is_some()
    }
}

/// Per-agent scoring outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub total_known_bugs: usize,
    /// Claims in paragraph order.
    pub claims: Vec<Claim>,
    /// Distinct bug indices hit by at least one claim.
    pub matched_bug_indices: BTreeSet<usize>,
    /// `|matched_bug_indices|`.
    pub unique_bugs_found: usize,
    /// Matched claims, not deduplicated. Diagnostic only.
    pub bugs_found: usize,
    /// `unique_bugs_found / total_known_bugs`, 0 when there are no known bugs.
    pub recall: f64,
    /// Claims with `match_kind == none`. Diagnostic only.
    pub unmatched_claim_count: usize,
    pub error: Option<String>,
}

/// Counters owned by a single harness run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub responses_evaluated: usize,
    pub paragraphs_segmented: usize,
    pub claims_emitted: usize,
}

/// Segments `response`, classifies every paragraph and aggregates the claims.
pub fn evaluate_response(
    response: &str,
    known_bugs: &[BugRecord],
    matcher: &ClaimMatcher,
    stats: &mut RunStats,
) -> EvaluationResult {
    let paragraphs = segment(response);
    let claims: Vec<Claim> = paragraphs
        .iter()
        .filter_map(|p| matcher.classify_paragraph(p, known_bugs))
        .collect();

    stats.responses_evaluated += 1;
    stats.paragraphs_segmented += paragraphs.len();
    stats.claims_emitted += claims.len();

    aggregate(claims, known_bugs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug(file: &str, line: usize, description: &str) -> BugRecord {
        BugRecord {
            file: file.to_string(),
            line,
            description: description.to_string(),
        }
    }

    #[test]
    fn test_bug_index_serialization() {
        assert_eq!(serde_json::to_string(&BugIndex::Known(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&BugIndex::Unmatched).unwrap(),
            "\"UNMATCHED\""
        );
        assert_eq!(
            serde_json::from_str::<BugIndex>("\"UNMATCHED\"").unwrap(),
            BugIndex::Unmatched
        );
        assert_eq!(serde_json::from_str::<BugIndex>("7").unwrap(), BugIndex::Known(7));
        assert!(serde_json::from_str::<BugIndex>("-1").is_err());
        assert!(serde_json::from_str::<BugIndex>("\"other\"").is_err());
    }

    #[test]
    fn test_unmatched_claim_has_no_kind() {
        let claim = Claim::unmatched("something is wrong here");
        assert_eq!(claim.match_kind, MatchKind::None);
        assert_eq!(claim.matched_bug_index, BugIndex::Unmatched);
        assert!(!claim.is_matched());

        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["matched_bug_index"], "UNMATCHED");
        assert_eq!(json["match_kind"], "none");
    }

    #[test]
    fn test_evaluate_response_compact_reference() {
        let bugs = vec![bug(
            "cache.py",
            24,
            "Using OrderedDict for LRU but not maintaining order properly",
        )];
        let matcher = ClaimMatcher::new(&["py".to_string()]).unwrap();
        let mut stats = RunStats::default();

        let result = evaluate_response(
            "1. cache.py:24 - Using OrderedDict for LRU but not maintaining order properly. Solution: move to end on access.",
            &bugs,
            &matcher,
            &mut stats,
        );

        assert_eq!(result.recall, 1.0);
        assert_eq!(result.claims.len(), 1);
        assert_eq!(result.claims[0].match_kind, MatchKind::LineNumber);
        assert_eq!(stats.responses_evaluated, 1);
        assert_eq!(stats.claims_emitted, 1);
    }

    #[test]
    fn test_evaluate_response_numbered_list() {
        let bugs = vec![
            bug("src/cache.py", 24, "Using OrderedDict for LRU but not maintaining order properly"),
            bug("src/cache.py", 43, "Should remove expired entry but doesn't"),
            bug("src/utils.py", 10, "Division by zero when list is empty"),
        ];
        let matcher = ClaimMatcher::new(&["py".to_string()]).unwrap();
        let mut stats = RunStats::default();
        let response = "Here is what I found:\n\n\
            1. **File: src/cache.py** Line 24: LRU ordering bug, order is never maintained.\n\
            2. **File: src/cache.py** Line 43: expired entry is never removed, which is a bug.\n\
            3. src/utils.py: division by zero error when the list is empty.\n\
            4. The same cache bug again at line 24.\n\
            5. A logging issue in main.py that nobody seeded.\n";

        let result = evaluate_response(response, &bugs, &matcher, &mut stats);

        assert_eq!(result.unique_bugs_found, 3);
        assert_eq!(result.bugs_found, 4);
        assert_eq!(result.unmatched_claim_count, 1);
        assert!((result.recall - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.paragraphs_segmented, 5);
    }

    #[test]
    fn test_evaluate_response_without_known_bugs() {
        let matcher = ClaimMatcher::new(&["py".to_string()]).unwrap();
        let mut stats = RunStats::default();
        let result = evaluate_response(
            "1. There is a bug in line 3 of main.py",
            &[],
            &matcher,
            &mut stats,
        );
        assert_eq!(result.recall, 0.0);
        assert_eq!(result.total_known_bugs, 0);
        assert_eq!(result.unmatched_claim_count, 1);
    }
}
