//! Splits a free-text agent response into candidate bug-claim paragraphs.
//!
//! Agent answers have no fixed schema, so segmentation is a cascade of
//! extractors ordered from most to least structured. Each stage only runs
//! while fewer than [`MIN_PARAGRAPHS`] candidates have been collected, so a
//! well-structured answer is never over-split by a coarser stage.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

/// Candidate count at which the cascade stops.
pub const MIN_PARAGRAPHS: usize = 5;

static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*((?:\*\*)?[0-9]+\.)").expect("valid numbered item regex")
});

static SECTION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^(?:file|line)").expect("valid section label regex"));

static BUG_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)bug|issue|problem").expect("valid bug label regex"));

static BOLD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\*\*").expect("valid bold line regex"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid blank line regex"));

/// How a stage's output combines with what earlier stages found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Append,
    Replace,
}

struct Stage {
    name: &'static str,
    extract: fn(&str) -> Vec<String>,
    merge: Merge,
}

const STAGES: [Stage; 4] = [
    Stage {
        name: "numbered",
        extract: numbered_items,
        merge: Merge::Append,
    },
    Stage {
        name: "file_line",
        extract: file_line_sections,
        merge: Merge::Append,
    },
    Stage {
        name: "bold",
        extract: bold_sections,
        merge: Merge::Append,
    },
    Stage {
        name: "blank_line",
        extract: blank_line_paragraphs,
        merge: Merge::Replace,
    },
];

/// Segments `response` into trimmed, non-empty candidate paragraphs.
pub fn segment(response: &str) -> Vec<String> {
    let text = response.replace("\r\n", "\n");
    let mut paragraphs: Vec<String> = Vec::new();

    for stage in &STAGES {
        if paragraphs.len() >= MIN_PARAGRAPHS {
            break;
        }
        let found = (stage.extract)(&text);
        trace!(stage = stage.name, found = found.len(), "Segmentation stage");
        match stage.merge {
            Merge::Append => paragraphs.extend(found),
            Merge::Replace => paragraphs = found,
        }
    }

    paragraphs
}

/// Items starting with `<digits>.` at a line start, optionally bolded.
///
/// Each item runs until the next item's line or the end of the text; any
/// preamble before the first item is dropped.
pub fn numbered_items(text: &str) -> Vec<String> {
    let starts: Vec<(usize, usize)> = NUMBERED_ITEM
        .captures_iter(text)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.start())))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, begin))| {
            let end = starts.get(i + 1).map_or(text.len(), |&(line, _)| line);
            text[begin..end].trim().to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Blocks opening with a `File`/`Line` label at a line start that later
/// mention `Bug`, `Issue` or `Problem`, running until the next blank line.
pub fn file_line_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut pos = 0;

    while let Some(label) = SECTION_LABEL.find_at(text, pos) {
        let Some(bug) = BUG_LABEL.find_at(text, label.end()) else {
            break;
        };
        let end = text[bug.end()..]
            .find("\n\n")
            .map_or(text.len(), |offset| bug.end() + offset);

        let section = text[label.start()..end].trim();
        if !section.is_empty() {
            sections.push(section.to_string());
        }
        pos = end;
    }

    sections
}

/// `**heading**: body` pairs, rendered as `"heading: body"`.
///
/// A body runs until the next line that opens with `**`.
pub fn bold_sections(text: &str) -> Vec<String> {
    let starts: Vec<(usize, usize)> = BOLD_LINE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    let mut sections = Vec::new();
    let mut i = 0;

    while i < starts.len() {
        let open = starts[i].1;
        let Some(close) = text[open..].find("**").map(|offset| open + offset) else {
            break;
        };
        let heading = text[open..close].trim();

        let mut body_start = close + 2;
        if text[body_start..].starts_with(':') {
            body_start += 1;
        }

        let next = starts[i + 1..]
            .iter()
            .position(|&(line, _)| line > body_start)
            .map(|offset| i + 1 + offset);
        let body_end = next.map_or(text.len(), |j| starts[j].0);
        let body = text[body_start..body_end].trim();

        sections.push(format!("{heading}: {body}"));

        match next {
            Some(j) => i = j,
            None => break,
        }
    }

    sections
}

/// The whole response split on blank lines.
pub fn blank_line_paragraphs(text: &str) -> Vec<String> {
    BLANK_LINES
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
