//! Aggregation of claims into per-agent metrics, and agent ranking.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::{Claim, EvaluationResult, MatchKind};

/// Fraction of known bugs found. Zero when there are no known bugs.
pub fn recall(unique_bugs_found: usize, total_known_bugs: usize) -> f64 {
    if total_known_bugs == 0 {
        0.0
    } else {
        unique_bugs_found as f64 / total_known_bugs as f64
    }
}

/// Builds the evaluation for one agent's claims.
///
/// Each known bug counts once no matter how many claims hit it. Indices
/// outside the ground truth are ignored.
pub fn aggregate(claims: Vec<Claim>, total_known_bugs: usize) -> EvaluationResult {
    let matched: Vec<usize> = claims
        .iter()
        .filter_map(Claim::bug_index)
        .filter(|&index| index < total_known_bugs)
        .collect();
    let matched_bug_indices: BTreeSet<usize> = matched.iter().copied().collect();
    let unmatched_claim_count = claims
        .iter()
        .filter(|c| c.match_kind == MatchKind::None)
        .count();
    let unique_bugs_found = matched_bug_indices.len();

    EvaluationResult {
        total_known_bugs,
        claims,
        unique_bugs_found,
        bugs_found: matched.len(),
        recall: recall(unique_bugs_found, total_known_bugs),
        unmatched_claim_count,
        matched_bug_indices,
        error: None,
    }
}

/// Zero-recall evaluation for an agent whose invocation failed.
pub fn failed_evaluation(total_known_bugs: usize, error: impl Into<String>) -> EvaluationResult {
    EvaluationResult {
        total_known_bugs,
        claims: Vec::new(),
        matched_bug_indices: BTreeSet::new(),
        unique_bugs_found: 0,
        bugs_found: 0,
        recall: 0.0,
        unmatched_claim_count: 0,
        error: Some(error.into()),
    }
}

/// Orders evaluations by recall, highest first. Ties keep input order.
pub fn rank<K>(evaluations: &[(K, EvaluationResult)]) -> Vec<&(K, EvaluationResult)> {
    let mut ranked: Vec<_> = evaluations.iter().collect();
    ranked.sort_by(|a, b| b.1.recall.partial_cmp(&a.1.recall).unwrap_or(Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_recall(recall: f64) -> EvaluationResult {
        let mut result = aggregate(Vec::new(), 10);
        result.recall = recall;
        result
    }

    #[test]
    fn test_duplicate_matches_count_once() {
        let claims = vec![
            Claim::matched("first mention", 0, MatchKind::LineNumber),
            Claim::matched("second mention", 0, MatchKind::Keyword),
            Claim::unmatched("an unrelated problem in the logger"),
        ];
        let result = aggregate(claims, 4);

        assert_eq!(result.unique_bugs_found, 1);
        assert_eq!(result.bugs_found, 2);
        assert_eq!(result.unmatched_claim_count, 1);
        assert_eq!(result.claims.len(), 3);
        assert!((result.recall - 0.25).abs() < f64::EPSILON);
        assert_eq!(result.matched_bug_indices, BTreeSet::from([0]));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_zero_known_bugs_gives_zero_recall() {
        let claims = vec![Claim::matched("stray", 0, MatchKind::Keyword)];
        let result = aggregate(claims, 0);
        assert_eq!(result.recall, 0.0);
        assert!(result.matched_bug_indices.is_empty());
        assert_eq!(recall(3, 0), 0.0);
    }

    #[test]
    fn test_recall_bounds() {
        let claims = (0..6)
            .map(|i| Claim::matched(format!("claim {i}"), i % 3, MatchKind::Keyword))
            .collect();
        let result = aggregate(claims, 3);
        assert_eq!(result.recall, 1.0);
        assert!(result.matched_bug_indices.iter().all(|&i| i < 3));
    }

    #[test]
    fn test_failed_evaluation() {
        let result = failed_evaluation(5, "Process timed out");
        assert_eq!(result.total_known_bugs, 5);
        assert_eq!(result.recall, 0.0);
        assert!(result.claims.is_empty());
        assert_eq!(result.error.as_deref(), Some("Process timed out"));
    }

    #[test]
    fn test_rank_is_stable() {
        let evaluations = vec![
            ("A", with_recall(0.5)),
            ("B", with_recall(0.8)),
            ("C", with_recall(0.5)),
        ];
        let order: Vec<&str> = rank(&evaluations).iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }
}
