//! Ground-truth bug scanner.
//!
//! Walks a codebase and extracts every sentinel comment (by default
//! `# BUG: <description>`) as a [`BugRecord`]. The resulting sequence is the
//! ground truth for a run: a bug is identified by its position in it, so the
//! scanner never reorders, deduplicates or drops records.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Component, Path};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::ScanError;

/// Default sentinel pattern. Capture group 1 is the bug description.
pub const DEFAULT_BUG_PATTERN: &str = r"# BUG:\s*(.*)";

/// Directory names that are never descended into.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[".git", "__pycache__", "venv", "env", "node_modules"];

/// A known, intentionally seeded bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
    /// Path relative to the scanned root, `/`-separated.
    pub file: String,
    /// 1-indexed line of the sentinel comment.
    pub line: usize,
    /// Free text following the sentinel.
    pub description: String,
}

impl fmt::Display for BugRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}): {}", self.file, self.line, self.description)
    }
}

/// A file that was visited but could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Everything a scan produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Ground truth in traversal order, then line order.
    pub bugs: Vec<BugRecord>,
    /// Number of files whose extension matched and that were read in full.
    pub files_scanned: usize,
    /// Files that matched the filter but were unreadable or dangling links. They contribute no records.
    pub skipped: Vec<SkippedFile>,
}

/// Scans a directory tree for sentinel comments.
#[derive(Debug, Clone)]
pub struct BugScanner {
    pattern: Regex,
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
}

impl BugScanner {
    /// Creates a scanner for `.py` files using the given sentinel pattern.
    pub fn new(pattern: &str) -> Result<Self, ScanError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            extensions: vec!["py".to_string()],
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|d| d.to_string()).collect(),
        })
    }

    /// Sets the file extensions to scan. Leading dots are ignored.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Sets the directory names to skip.
    pub fn with_ignored_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Scans `root` recursively.
    ///
    /// A missing or non-directory root is an error. Unreadable files below the
    /// root are logged, recorded in [`ScanOutcome::skipped`] and do not abort
    /// the scan.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome, ScanError> {
        if !root.exists() {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::RootNotDirectory(root.to_path_buf()));
        }

        info!(root = %root.display(), "Scanning codebase for bugs");
        let mut outcome = ScanOutcome::default();

        // Files before subdirectories, each group by name, like a top-down walk.
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(ScanError::Walk(e.to_string()));
                    }
                    let path = e
                        .path()
                        .map(|p| relative_path(root, p))
                        .unwrap_or_default();
                    warn!(path = %path, error = %e, "Skipping unreadable entry");
                    outcome.skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !self.matches_extension(entry.path()) {
                continue;
            }

            let rel = relative_path(root, entry.path());

            // Linked directories are not descended into; linked files are scanned.
            if entry.path_is_symlink() {
                if !entry.path().exists() {
                    warn!(file = %rel, "Skipping dangling symlink");
                    outcome.skipped.push(SkippedFile {
                        path: rel,
                        reason: "dangling symbolic link".to_string(),
                    });
                    continue;
                }
                if !entry.path().is_file() {
                    continue;
                }
            } else if !entry.file_type().is_file() {
                continue;
            }

            match self.scan_file(entry.path(), &rel) {
                Ok(bugs) => {
                    debug!(file = %rel, bugs = bugs.len(), "Scanned file");
                    outcome.files_scanned += 1;
                    outcome.bugs.extend(bugs);
                }
                Err(e) => {
                    warn!(file = %rel, error = %e, "Skipping unreadable file");
                    outcome.skipped.push(SkippedFile {
                        path: rel,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            bugs = outcome.bugs.len(),
            files = outcome.files_scanned,
            skipped = outcome.skipped.len(),
            "Found {} bugs in the codebase",
            outcome.bugs.len()
        );
        Ok(outcome)
    }

    /// Reads one file line by line. Any read error discards the whole file.
    fn scan_file(&self, path: &Path, rel: &str) -> io::Result<Vec<BugRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut bugs = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(description) = self.extract_description(&line) {
                bugs.push(BugRecord {
                    file: rel.to_string(),
                    line: index + 1,
                    description,
                });
            }
        }

        Ok(bugs)
    }

    /// Returns the description captured from a sentinel line, if any.
    ///
    /// Patterns without a capture group yield the whole match.
    pub fn extract_description(&self, line: &str) -> Option<String> {
        let captures = self.pattern.captures(line)?;
        let text = captures.get(1).or_else(|| captures.get(0))?;
        Some(text.as_str().trim().to_string())
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    fn is_ignored_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && self
                .ignored_dirs
                .iter()
                .any(|d| entry.file_name().to_string_lossy() == d.as_str())
    }
}

/// Renders `path` relative to `root` with `/` separators.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner() -> BugScanner {
        BugScanner::new(DEFAULT_BUG_PATTERN).unwrap()
    }

    #[test]
    fn test_scan_preserves_file_and_line_order() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(
            temp.path().join("main.py"),
            "import os\n# BUG: missing error handling\n",
        )
        .unwrap();
        fs::write(
            src.join("cache.py"),
            "class C:\n    # BUG: Using OrderedDict for LRU but not maintaining order properly\n    pass\n    # BUG: Should remove expired entry but doesn't\n",
        )
        .unwrap();
        fs::write(src.join("a.py"), "x = 1  # BUG:   off by one   \n").unwrap();

        let outcome = scanner().scan(temp.path()).unwrap();
        let bugs = outcome.bugs;

        assert_eq!(bugs.len(), 4);
        assert_eq!(bugs[0].file, "main.py");
        assert_eq!(bugs[0].line, 2);
        assert_eq!(bugs[1].file, "src/a.py");
        assert_eq!(bugs[1].description, "off by one");
        assert_eq!(bugs[2].file, "src/cache.py");
        assert_eq!(bugs[2].line, 2);
        assert_eq!(bugs[3].line, 4);
        assert_eq!(outcome.files_scanned, 3);
    }

    #[test]
    fn test_scan_keeps_duplicate_records() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("dup.py"),
            "# BUG: same text\n# BUG: same text\n",
        )
        .unwrap();

        let bugs = scanner().scan(temp.path()).unwrap().bugs;
        assert_eq!(bugs.len(), 2);
        assert_eq!(bugs[0].description, bugs[1].description);
        assert_ne!(bugs[0].line, bugs[1].line);
    }

    #[test]
    fn test_scan_filters_extensions_and_ignored_dirs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.txt"), "# BUG: not python\n").unwrap();
        let ignored = temp.path().join("__pycache__");
        fs::create_dir(&ignored).unwrap();
        fs::write(ignored.join("mod.py"), "# BUG: cached copy\n").unwrap();
        fs::write(temp.path().join("real.py"), "# BUG: real one\n").unwrap();

        let bugs = scanner().scan(temp.path()).unwrap().bugs;
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].file, "real.py");

        let bugs = scanner()
            .with_extensions([".txt"])
            .scan(temp.path())
            .unwrap()
            .bugs;
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].file, "notes.txt");
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let err = scanner().scan(&missing).unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));
    }

    #[test]
    fn test_scan_file_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("one.py");
        fs::write(&file, "# BUG: x\n").unwrap();
        let err = scanner().scan(&file).unwrap_err();
        assert!(matches!(err, ScanError::RootNotDirectory(_)));
    }

    #[test]
    fn test_unreadable_file_is_skipped_not_fatal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.py"), [0x23, 0x20, 0xff, 0xfe, 0x0a]).unwrap();
        fs::write(temp.path().join("good.py"), "# BUG: fine\n").unwrap();

        let outcome = scanner().scan(temp.path()).unwrap();
        assert_eq!(outcome.bugs.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "bad.py");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_scanned() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("target.py");
        fs::write(&target, "# BUG: reached through a link\n").unwrap();
        fs::write(temp.path().join("plain.py"), "# BUG: plain file\n").unwrap();
        std::os::unix::fs::symlink(&target, temp.path().join("linked.py")).unwrap();

        let outcome = scanner().scan(temp.path()).unwrap();
        assert_eq!(outcome.bugs.len(), 2);
        assert_eq!(outcome.bugs[0].file, "linked.py");
        assert_eq!(outcome.bugs[0].description, "reached through a link");
        assert_eq!(outcome.bugs[1].file, "plain.py");
        assert_eq!(outcome.files_scanned, 2);
        assert!(outcome.skipped.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_recorded_as_skipped() {
        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone.py"), temp.path().join("broken.py"))
            .unwrap();
        fs::write(temp.path().join("ok.py"), "# BUG: still found\n").unwrap();

        let outcome = scanner().scan(temp.path()).unwrap();
        assert_eq!(outcome.bugs.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "broken.py");
    }

    #[test]
    fn test_pattern_without_group_uses_whole_match() {
        let scanner = BugScanner::new(r"FIXME.*").unwrap();
        assert_eq!(
            scanner.extract_description("// FIXME later "),
            Some("FIXME later".to_string())
        );
        assert_eq!(scanner.extract_description("clean line"), None);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            BugScanner::new("(unclosed"),
            Err(ScanError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_bug_record_display() {
        let bug = BugRecord {
            file: "src/cache.py".to_string(),
            line: 24,
            description: "stale entries".to_string(),
        };
        assert_eq!(bug.to_string(), "src/cache.py (line 24): stale entries");
    }
}
