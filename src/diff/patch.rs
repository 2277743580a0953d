//! Unified diff parsing and application.
//!
//! Application is tried strictly first (header line numbers and counts must
//! hold), then by re-locating hunks by content, then as textual
//! search/replace. The outcome records which recovery, if any, was used.

use super::search_replace::apply_search_replace;
use crate::models::{DiffFallbackMethod, SearchReplaceBlock};
use regex::Regex;
use std::sync::OnceLock;

fn hunk_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@\s*-(\d+)(?:,(\d+))?\s+\+(\d+)(?:,(\d+))?\s*@@").expect("hunk range regex")
    })
}

/// A single line in a diff hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Add(String),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based start in the original file, when the header carried numbers.
    pub old_start: Option<usize>,
    pub old_count: Option<usize>,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines the hunk expects to find (context and removals).
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines the hunk leaves behind (context and additions).
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedPatch {
    pub hunks: Vec<Hunk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub content: String,
    pub fallback: Option<DiffFallbackMethod>,
}

/// Parse unified diff text into hunks. File headers are skipped.
pub fn parse_patch(text: &str) -> Result<UnifiedPatch, String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("@@") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            let (old_start, old_count) = match hunk_range_re().captures(line) {
                Some(caps) => (
                    caps.get(1).and_then(|m| m.as_str().parse().ok()),
                    Some(caps.get(2).map_or(Some(1), |m| m.as_str().parse().ok()).unwrap_or(1)),
                ),
                None => (None, None),
            };
            current = Some(Hunk {
                old_start,
                old_count,
                lines: Vec::new(),
            });
        } else if is_file_header(&lines, i) {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
        } else if let Some(hunk) = current.as_mut() {
            if let Some(rest) = line.strip_prefix('+') {
                hunk.lines.push(HunkLine::Add(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('-') {
                hunk.lines.push(HunkLine::Remove(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix(' ') {
                hunk.lines.push(HunkLine::Context(rest.to_string()));
            } else if line.starts_with('\\') {
                // "\ No newline at end of file"
            } else {
                hunk.lines.push(HunkLine::Context(line.to_string()));
            }
        }
        i += 1;
    }
    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }

    // Blank context past the header's count comes from fence padding. A
    // blank context line the header accounts for is real and stays.
    for hunk in &mut hunks {
        while matches!(hunk.lines.last(), Some(HunkLine::Context(s)) if s.trim().is_empty())
            && hunk.old_count.map_or(true, |count| hunk.old_lines().len() > count)
        {
            hunk.lines.pop();
        }
    }
    hunks.retain(|h| !h.lines.is_empty());

    if hunks.is_empty() {
        return Err("No hunks found in diff".to_string());
    }
    Ok(UnifiedPatch { hunks })
}

fn is_file_header(lines: &[&str], i: usize) -> bool {
    let line = lines[i];
    if line.starts_with("diff --git ") || line.starts_with("index ") {
        return true;
    }
    if line.starts_with("--- ") {
        return lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "));
    }
    line.starts_with("+++ ") && i > 0 && lines[i - 1].starts_with("--- ")
}

/// Applies a unified diff, recovering from mismatched headers or content.
pub fn apply_patch(original: &str, patch_text: &str) -> Result<PatchOutcome, String> {
    let patch = parse_patch(patch_text)?;

    let strict_error = match apply_strict(original, &patch) {
        Ok(content) => {
            return Ok(PatchOutcome {
                content,
                fallback: None,
            })
        }
        Err(e) => e,
    };
    log::warn!("Strict patch application failed: {}", strict_error);

    if let Ok(content) = apply_recount(original, &patch) {
        log::warn!("Patch applied after recounting hunk positions");
        return Ok(PatchOutcome {
            content,
            fallback: Some(DiffFallbackMethod::Recount),
        });
    }

    let blocks: Vec<SearchReplaceBlock> = patch
        .hunks
        .iter()
        .map(|hunk| SearchReplaceBlock {
            search: hunk.old_lines().join("\n"),
            replace: hunk.new_lines().join("\n"),
        })
        .collect();
    match apply_search_replace(original, &blocks) {
        Ok(content) => {
            log::warn!("Patch applied as textual search and replace");
            Ok(PatchOutcome {
                content,
                fallback: Some(DiffFallbackMethod::SearchAndReplace),
            })
        }
        Err(e) => Err(format!("{}; textual recovery failed: {}", strict_error, e)),
    }
}

struct Lines<'a> {
    lines: Vec<&'a str>,
    line_ending: &'static str,
    trailing_newline: bool,
}

impl<'a> Lines<'a> {
    fn split(text: &'a str) -> Self {
        Lines {
            lines: text.lines().collect(),
            line_ending: if text.contains("\r\n") { "\r\n" } else { "\n" },
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        }
    }

    fn join(self, lines: Vec<&str>) -> String {
        let mut joined = lines.join(self.line_ending);
        if self.trailing_newline && !joined.is_empty() {
            joined.push_str(self.line_ending);
        }
        joined
    }
}

/// Header positions and counts must match exactly.
fn apply_strict(original: &str, patch: &UnifiedPatch) -> Result<String, String> {
    let source = Lines::split(original);
    let mut result: Vec<&str> = source.lines.clone();
    let mut offset: isize = 0;

    for (index, hunk) in patch.hunks.iter().enumerate() {
        let old_start = hunk
            .old_start
            .ok_or_else(|| format!("hunk {} has no line numbers", index + 1))?;
        let old = hunk.old_lines();
        if hunk.old_count.is_some_and(|count| count != old.len()) {
            return Err(format!("hunk {} line count does not match its header", index + 1));
        }

        // `-0,0` inserts before the first line.
        let base = if old.is_empty() { old_start } else { old_start.saturating_sub(1) };
        let pos = base as isize + offset;
        if pos < 0 || pos as usize + old.len() > result.len() {
            return Err(format!("hunk {} is out of range", index + 1));
        }
        let pos = pos as usize;
        if result[pos..pos + old.len()] != old[..] {
            return Err(format!("hunk {} context does not match at line {}", index + 1, old_start));
        }

        let new = hunk.new_lines();
        offset += new.len() as isize - old.len() as isize;
        result.splice(pos..pos + old.len(), new);
    }
    Ok(source.join(result))
}

/// Ignores header numbers and finds each hunk by its content.
fn apply_recount(original: &str, patch: &UnifiedPatch) -> Result<String, String> {
    let source = Lines::split(original);
    let mut result: Vec<&str> = source.lines.clone();
    let mut cursor = 0usize;

    for (index, hunk) in patch.hunks.iter().enumerate() {
        let old = hunk.old_lines();
        let new = hunk.new_lines();
        let pos = if old.is_empty() {
            hunk.old_start.unwrap_or(result.len()).min(result.len())
        } else {
            find_window(&result, &old, cursor)
                .or_else(|| find_window(&result, &old, 0))
                .ok_or_else(|| format!("hunk {} not found in file", index + 1))?
        };
        let new_len = new.len();
        result.splice(pos..pos + old.len(), new);
        cursor = pos + new_len;
    }
    Ok(source.join(result))
}

fn find_window(haystack: &[&str], needle: &[&str], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&start| haystack[start..start + needle.len()] == *needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_diff() {
        let diff = "--- a/src/example.ts\n+++ b/src/example.ts\n@@ -1,4 +1,5 @@\n function hello() {\n-  console.log(\"old\");\n+  console.log(\"new\");\n+  console.log(\"extra\");\n   return true;\n }\n";
        let parsed = parse_patch(diff).unwrap();
        assert_eq!(parsed.hunks.len(), 1);
        assert_eq!(parsed.hunks[0].old_start, Some(1));
        assert_eq!(parsed.hunks[0].old_count, Some(4));
        assert_eq!(parsed.hunks[0].old_lines().len(), 4);
        assert_eq!(parsed.hunks[0].new_lines().len(), 5);
    }

    #[test]
    fn test_strict_apply() {
        let original = "function hello() {\n  console.log(\"old\");\n  return true;\n}\n";
        let diff = "--- a/test.ts\n+++ b/test.ts\n@@ -1,4 +1,5 @@\n function hello() {\n-  console.log(\"old\");\n+  console.log(\"new\");\n+  console.log(\"extra\");\n   return true;\n }\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.fallback, None);
        assert_eq!(
            outcome.content,
            "function hello() {\n  console.log(\"new\");\n  console.log(\"extra\");\n  return true;\n}\n"
        );
    }

    #[test]
    fn test_multiple_hunks_track_offset() {
        let original = "a\nb\nc\nd\ne\nf\n";
        let diff = "@@ -1,2 +1,3 @@\n a\n+a2\n b\n@@ -5,2 +6,1 @@\n e\n-f\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.fallback, None);
        assert_eq!(outcome.content, "a\na2\nb\nc\nd\ne\n");
    }

    #[test]
    fn test_wrong_line_numbers_recount() {
        let original = "one\ntwo\nthree\nfour\n";
        let diff = "@@ -1,2 +1,2 @@\n three\n-four\n+FOUR\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.fallback, Some(DiffFallbackMethod::Recount));
        assert_eq!(outcome.content, "one\ntwo\nthree\nFOUR\n");
    }

    #[test]
    fn test_loose_hunk_header_recounts() {
        let original = "x = 1\ny = 2\n";
        let diff = "@@ ... @@\n-y = 2\n+y = 3\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.fallback, Some(DiffFallbackMethod::Recount));
        assert_eq!(outcome.content, "x = 1\ny = 3\n");
    }

    #[test]
    fn test_whitespace_drift_uses_search_and_replace() {
        let original = "fn main() {\n    run();   \n}\n";
        let diff = "@@ -1,3 +1,3 @@\n fn main() {\n-    run();\n+    run_fast();\n }\n";
        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.fallback, Some(DiffFallbackMethod::SearchAndReplace));
        assert_eq!(outcome.content, "fn main() {\n    run_fast();\n}\n");
    }

    #[test]
    fn test_unmatched_patch_is_reported() {
        let err = apply_patch("a\nb\n", "@@ -1,1 +1,1 @@\n-missing\n+present\n").unwrap_err();
        assert!(err.contains("hunk 1"));
    }

    #[test]
    fn test_new_file_patch() {
        let diff = "--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+hello\n+world\n";
        let outcome = apply_patch("", diff).unwrap();
        assert_eq!(outcome.content, "hello\nworld\n");
        assert_eq!(outcome.fallback, None);
    }

    #[test]
    fn test_trailing_blank_context_line_is_kept() {
        let original = "fn a() {\n    old();\n}\n\nfn b() {}\n";
        let diff = "@@ -1,4 +1,4 @@\n fn a() {\n-    old();\n+    new();\n }\n \n";
        let parsed = parse_patch(diff).unwrap();
        assert_eq!(parsed.hunks[0].old_lines().len(), 4);

        let outcome = apply_patch(original, diff).unwrap();
        assert_eq!(outcome.fallback, None);
        assert_eq!(outcome.content, "fn a() {\n    new();\n}\n\nfn b() {}\n");
    }

    #[test]
    fn test_blank_padding_beyond_header_count_is_dropped() {
        let diff = "@@ -1,2 +1,2 @@\n a\n-b\n+c\n\n\n";
        let parsed = parse_patch(diff).unwrap();
        assert_eq!(parsed.hunks[0].old_lines(), vec!["a", "b"]);
        assert_eq!(apply_patch("a\nb\n", diff).unwrap().fallback, None);
    }

    #[test]
    fn test_no_hunks_is_an_error() {
        assert!(parse_patch("--- a/x\n+++ b/x\n").is_err());
    }
}
