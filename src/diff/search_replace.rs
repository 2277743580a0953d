//! Ordered search/replace application.
//!
//! Blocks are folded over the content: each one searches the output of the
//! previous block, so later blocks can match text earlier ones inserted.

use crate::models::SearchReplaceBlock;

/// Applies `blocks` in order, returning the first block that failed to match.
pub fn apply_search_replace(original: &str, blocks: &[SearchReplaceBlock]) -> Result<String, String> {
    blocks
        .iter()
        .enumerate()
        .try_fold(original.to_string(), |content, (index, block)| {
            apply_block(&content, block).ok_or_else(|| {
                format!(
                    "search block {} of {} not found: {}",
                    index + 1,
                    blocks.len(),
                    first_line(&block.search)
                )
            })
        })
}

fn apply_block(content: &str, block: &SearchReplaceBlock) -> Option<String> {
    if block.search.trim().is_empty() {
        return Some(append(content, &block.replace));
    }
    if let Some(pos) = content.find(&block.search) {
        let mut result = String::with_capacity(content.len() + block.replace.len());
        result.push_str(&content[..pos]);
        result.push_str(&block.replace);
        result.push_str(&content[pos + block.search.len()..]);
        return Some(result);
    }
    replace_lines(content, &block.search, &block.replace, str::trim_end)
        .or_else(|| replace_lines(content, &block.search, &block.replace, str::trim))
}

/// Line-window match using `normalize` on both sides.
fn replace_lines(
    content: &str,
    search: &str,
    replace: &str,
    normalize: fn(&str) -> &str,
) -> Option<String> {
    let line_ending = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let lines: Vec<&str> = content.lines().collect();
    let needle: Vec<&str> = trim_blank_edges(search.lines().collect());
    if needle.is_empty() || needle.len() > lines.len() {
        return None;
    }

    let start = (0..=lines.len() - needle.len()).find(|&start| {
        needle
            .iter()
            .zip(&lines[start..start + needle.len()])
            .all(|(a, b)| normalize(a) == normalize(b))
    })?;

    let replacement = trim_blank_edges(replace.lines().collect());
    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    result.extend_from_slice(&lines[..start]);
    result.extend_from_slice(&replacement);
    result.extend_from_slice(&lines[start + needle.len()..]);

    let mut joined = result.join(line_ending);
    if content.ends_with('\n') && !joined.is_empty() {
        joined.push_str(line_ending);
    }
    Some(joined)
}

fn trim_blank_edges(mut lines: Vec<&str>) -> Vec<&str> {
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

fn append(content: &str, addition: &str) -> String {
    if content.is_empty() {
        return addition.to_string();
    }
    let mut result = content.to_string();
    if !result.ends_with('\n') {
        result.push('\n');
    }
    result.push_str(addition);
    result
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(search: &str, replace: &str) -> SearchReplaceBlock {
        SearchReplaceBlock {
            search: search.to_string(),
            replace: replace.to_string(),
        }
    }

    #[test]
    fn test_blocks_apply_against_evolving_content() {
        let original = "fn a() {}\n";
        let blocks = vec![
            block("fn a() {}", "fn a() {}\nfn b() {}"),
            block("fn b() {}", "fn b() { a(); }"),
        ];
        let result = apply_search_replace(original, &blocks).unwrap();
        assert_eq!(result, "fn a() {}\nfn b() { a(); }\n");
    }

    #[test]
    fn test_trailing_whitespace_tolerance() {
        let original = "let a = 1;   \nlet b = 2;\n";
        let result = apply_search_replace(original, &[block("let a = 1;\nlet b = 2;", "let c = 3;")]).unwrap();
        assert_eq!(result, "let c = 3;\n");
    }

    #[test]
    fn test_indentation_tolerance() {
        let original = "fn f() {\n    call();\n}\n";
        let result = apply_search_replace(original, &[block("\tcall();", "    other();")]).unwrap();
        assert_eq!(result, "fn f() {\n    other();\n}\n");
    }

    #[test]
    fn test_missing_block_reports_index() {
        let err = apply_search_replace("a\n", &[block("a", "b"), block("zzz", "y")]).unwrap_err();
        assert!(err.contains("search block 2 of 2"));
    }

    #[test]
    fn test_empty_search_appends() {
        assert_eq!(apply_search_replace("", &[block("", "new")]).unwrap(), "new");
        assert_eq!(apply_search_replace("a", &[block("", "b")]).unwrap(), "a\nb");
    }
}
