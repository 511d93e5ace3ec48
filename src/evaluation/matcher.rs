//! Links a candidate paragraph to at most one known bug.
//!
//! Known bugs are tried in ground-truth order. For each bug the matcher tries,
//! in this order:
//!
//! 1. line number: the paragraph's claimed line equals the bug's line
//! 2. file and keyword: the claimed file is compatible with the bug's file and
//!    one description keyword appears in the paragraph
//! 3. keyword: at least two description keywords appear (or the only one does)
//!
//! The first success wins. Bug-shaped paragraphs that match nothing become
//! unmatched claims; everything else is dropped.

use regex::Regex;
use tracing::trace;

use super::{Claim, MatchKind};
use crate::scanner::BugRecord;

/// Words whose presence marks a paragraph as describing a bug.
pub const BUG_INDICATORS: &[&str] = &[
    "bug",
    "issue",
    "problem",
    "error",
    "incorrect",
    "wrong",
    "missing",
    "should",
    "improper",
    "invalid",
    "fail",
];

/// Tokens never treated as description keywords.
pub const KEYWORD_STOPWORDS: &[&str] = &["this", "that", "should", "would", "could", "will"];

/// Lower-cased sentinel text.
pub const SENTINEL_TEXT: &str = "# bug:";

/// Unmatched paragraphs at or below this many characters are dropped,
/// unless they quote the sentinel.
const UNMATCHED_MIN_CHARS: usize = 20;

/// Classifies paragraphs against a ground-truth bug list.
#[derive(Debug, Clone)]
pub struct ClaimMatcher {
    line_label: Regex,
    file_label: Regex,
    compact_ref: Regex,
}

impl ClaimMatcher {
    /// Builds a matcher that recognises file paths with the given extensions.
    pub fn new(extensions: &[String]) -> Result<Self, regex::Error> {
        let escaped: Vec<String> = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| regex::escape(&e))
            .collect();
        let ext = if escaped.is_empty() {
            r"\w+".to_string()
        } else {
            format!("(?:{})", escaped.join("|"))
        };

        Ok(Self {
            line_label: Regex::new(r"(?:\bline:?|\*\*line\*\*:?)\s*([0-9]+)")?,
            file_label: Regex::new(&format!(
                r#"(?:\bfile:?|\*\*file\*\*:?)\s*['"]?([\w./]+\.{ext})['"]?"#
            ))?,
            compact_ref: Regex::new(&format!(r"([\w./-]+\.{ext}):([0-9]+)"))?,
        })
    }

    /// Returns the claim `paragraph` makes about `known_bugs`, if any.
    pub fn classify_paragraph(&self, paragraph: &str, known_bugs: &[BugRecord]) -> Option<Claim> {
        let text = paragraph.trim();
        if text.is_empty() {
            return None;
        }

        let lower = text.to_lowercase();
        if !self.is_bug_shaped(&lower) {
            return None;
        }

        let claimed_line = self.claimed_line(&lower);
        let claimed_file = self.claimed_file(&lower);

        for (index, bug) in known_bugs.iter().enumerate() {
            if let Some(kind) = match_bug(&lower, claimed_line, claimed_file.as_deref(), bug) {
                trace!(bug = index, kind = %kind, "Paragraph matched known bug");
                return Some(Claim::matched(text, index, kind));
            }
        }

        if text.chars().count() > UNMATCHED_MIN_CHARS || lower.contains(SENTINEL_TEXT) {
            return Some(Claim::unmatched(text));
        }
        None
    }

    /// A paragraph describes a bug if it uses an indicator word, quotes the
    /// sentinel, or points at a location (`line N` label or `file.ext:N`).
    pub fn is_bug_shaped(&self, lower: &str) -> bool {
        BUG_INDICATORS.iter().any(|word| lower.contains(word))
            || lower.lines().any(|line| line.contains(SENTINEL_TEXT))
            || self.line_label.is_match(lower)
            || self.compact_ref.is_match(lower)
    }

    /// Line number from a `line N` / `line: N` / `**line**: N` label, else
    /// from a compact `file.ext:N` reference.
    pub fn claimed_line(&self, lower: &str) -> Option<usize> {
        self.line_label
            .captures(lower)
            .and_then(|c| c.get(1))
            .or_else(|| self.compact_ref.captures(lower).and_then(|c| c.get(2)))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// File path from a `file` / `file:` / `**file**:` label, else from a
    /// compact `file.ext:N` reference.
    pub fn claimed_file(&self, lower: &str) -> Option<String> {
        self.file_label
            .captures(lower)
            .and_then(|c| c.get(1))
            .or_else(|| self.compact_ref.captures(lower).and_then(|c| c.get(1)))
            .map(|m| m.as_str().to_string())
    }
}

fn match_bug(
    lower: &str,
    claimed_line: Option<usize>,
    claimed_file: Option<&str>,
    bug: &BugRecord,
) -> Option<MatchKind> {
    if claimed_line == Some(bug.line) {
        return Some(MatchKind::LineNumber);
    }

    let keywords = keywords(&bug.description);

    if let Some(file) = claimed_file {
        if files_compatible(file, &bug.file.to_lowercase())
            && keywords.iter().any(|k| lower.contains(k.as_str()))
        {
            return Some(MatchKind::FileAndKeyword);
        }
    }

    let overlap = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
    if overlap >= 2 || (overlap == 1 && keywords.len() == 1) {
        return Some(MatchKind::Keyword);
    }

    None
}

/// Lower-cased description tokens longer than three characters, minus stopwords.
///
/// Tokens are whitespace separated and keep their punctuation; duplicates are
/// kept so repeated words count twice.
pub fn keywords(description: &str) -> Vec<String> {
    description
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3 && !KEYWORD_STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Case-insensitive containment in either direction.
fn files_compatible(claimed: &str, bug_file: &str) -> bool {
    !claimed.is_empty()
        && !bug_file.is_empty()
        && (bug_file.contains(claimed) || claimed.contains(bug_file))
}
