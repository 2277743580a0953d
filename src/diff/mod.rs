//! Line statistics and patch application for proposed file contents.

pub mod patch;
pub mod search_replace;

pub use patch::{apply_patch, parse_patch, PatchOutcome, UnifiedPatch};
pub use search_replace::apply_search_replace;

use similar::{Algorithm, TextDiff};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub lines_added: usize,
    pub lines_removed: usize,
}

/// Splits on `\r?\n` and drops trailing whitespace so formatting-only
/// changes (including a final newline) do not count.
fn normalize_lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim_end).collect()
}

/// Counts added and removed lines between two versions of a file.
pub fn diff_stats(original: &str, proposed: &str) -> DiffStats {
    let old = normalize_lines(original);
    let new = normalize_lines(proposed);
    if old == new {
        return DiffStats::default();
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(old.as_slice(), new.as_slice());
    let unified = diff
        .unified_diff()
        .context_radius(0)
        .missing_newline_hint(false)
        .header("original", "proposed")
        .to_string();

    let mut stats = DiffStats::default();
    for line in unified.lines().skip_while(|l| !l.starts_with("@@")) {
        if line.starts_with('+') {
            stats.lines_added += 1;
        } else if line.starts_with('-') {
            stats.lines_removed += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_change() {
        let stats = diff_stats("a\nb\nc", "a\nx\nc");
        assert_eq!(
            stats,
            DiffStats {
                lines_added: 1,
                lines_removed: 1
            }
        );
    }

    #[test]
    fn test_whitespace_only_changes_are_ignored() {
        assert_eq!(diff_stats("a  \r\nb\n", "a\nb"), DiffStats::default());
    }

    #[test]
    fn test_new_file_counts_every_line() {
        let stats = diff_stats("", "one\ntwo\nthree\n");
        assert_eq!(stats.lines_added, 3);
        assert_eq!(stats.lines_removed, 0);
    }

    #[test]
    fn test_removed_lines_that_look_like_headers() {
        let stats = diff_stats("-- comment\nselect 1;", "select 1;");
        assert_eq!(stats.lines_removed, 1);
        assert_eq!(stats.lines_added, 0);
    }

    #[test]
    fn test_stats_are_symmetric() {
        let pairs = [
            ("a\nb\nc\nd", "a\nc\nd\ne\nf"),
            ("fn main() {}\n", "use std::io;\n\nfn main() {\n    println!(\"x\");\n}\n"),
            ("x", ""),
        ];
        for (a, b) in pairs {
            let forward = diff_stats(a, b);
            let backward = diff_stats(b, a);
            assert_eq!(forward.lines_added, backward.lines_removed);
            assert_eq!(forward.lines_removed, backward.lines_added);
        }
    }
}
