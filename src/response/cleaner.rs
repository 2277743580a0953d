//! Strips wrapper artifacts (thought blocks, outer fences, XML document
//! wrappers) from raw model output before segment parsing.

use super::fence;

/// Upper bound for every fixed-point loop in this module.
const MAX_ITERATIONS: usize = 64;

const THOUGHT_TAGS: [(&str, &str); 2] = [("<think>", "</think>"), ("<thought>", "</thought>")];

/// Fence info strings that mark a fence as a document wrapper rather than code.
const WRAPPER_FENCE_LANGUAGES: [&str; 7] = ["", "xml", "markdown", "md", "text", "txt", "plaintext"];

/// Cleans raw response text. Never fails; the worst case is the trimmed input.
pub fn clean(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    for _ in 0..MAX_ITERATIONS {
        let next = clean_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_pass(text: &str) -> String {
    let text = strip_thought_block(text);
    let text = collapse_outer_fences(&text);
    strip_wrappers(&text)
}

/// Removes a leading `<think>`/`<thought>` block. Unterminated blocks stay.
fn strip_thought_block(text: &str) -> String {
    let trimmed = text.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    for (open, close) in THOUGHT_TAGS {
        if !lower.starts_with(open) {
            continue;
        }
        if let Some(end) = lower.find(close) {
            return trimmed[end + close.len()..].trim().to_string();
        }
        log::debug!("Unterminated {} block left in place", open);
    }
    text.to_string()
}

/// Collapses text to the interior of its outermost fence pair when that pair
/// wraps further edit structure and something sits outside it.
fn collapse_outer_fences(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let fences = fence::fence_lines(&lines);
    if fences.len() < 2 {
        return text.to_string();
    }
    let first = fences[0].index;
    let last = fences[fences.len() - 1].index;

    let before = lines[..first].iter().any(|l| !l.trim().is_empty());
    let after = lines[last + 1..].iter().any(|l| !l.trim().is_empty());
    if !before && !after {
        return text.to_string();
    }
    if fence::closing_fence(&lines, first) != Some(last) {
        return text.to_string();
    }

    let interior = &lines[first + 1..last];
    let wraps_edits = interior
        .iter()
        .any(|l| fence::is_fence(l) || l.contains("<file ") || l.contains("<files"));
    if !wraps_edits {
        return text.to_string();
    }
    log::debug!("Collapsing outer fence pair at lines {}..{}", first, last);
    interior.join("\n")
}

/// Strips leading openers and trailing closers until nothing changes.
fn strip_wrappers(text: &str) -> String {
    let mut current = text.trim().to_string();
    for _ in 0..MAX_ITERATIONS {
        let next = strip_trailing(&strip_leading(&current)).trim().to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn strip_leading(text: &str) -> String {
    let text = text.trim_start();
    if let Some(rest) = text.strip_prefix("<![CDATA[") {
        return rest.to_string();
    }
    for tag in ["<files>", "<file>"] {
        if let Some(rest) = text.strip_prefix(tag) {
            return rest.to_string();
        }
    }

    let first_line = text.lines().next().unwrap_or("").trim();
    let lower = first_line.to_ascii_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<?xml") {
        return drop_first_line(text);
    }

    let lines: Vec<&str> = text.lines().collect();
    if let Some(info) = lines.first().and_then(|l| fence::fence_info(l)) {
        let language = info.to_ascii_lowercase();
        let wrapper = WRAPPER_FENCE_LANGUAGES.contains(&language.as_str());
        let last = lines.len() - 1;
        if wrapper && last > 0 && fence::closing_fence(&lines, 0) == Some(last) {
            return lines[1..last].join("\n");
        }
    }
    text.to_string()
}

fn strip_trailing(text: &str) -> String {
    let text = text.trim_end();
    for closer in ["]]>", "</files>", "</file>"] {
        if let Some(rest) = text.strip_suffix(closer) {
            return rest.to_string();
        }
    }
    let lines: Vec<&str> = text.lines().collect();
    if fence::has_dangling_trailing_fence(&lines) {
        return lines[..lines.len() - 1].join("\n");
    }
    text.to_string()
}

fn drop_first_line(text: &str) -> String {
    match text.find('\n') {
        Some(pos) => text[pos + 1..].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strips_think_block() {
        let raw = "<think>\nreasoning here\n</think>\nActual answer";
        assert_eq!(clean(raw), "Actual answer");
    }

    #[test]
    fn test_unterminated_think_is_kept() {
        let raw = "<think>\nstill thinking";
        assert_eq!(clean(raw), raw);
    }

    #[test]
    fn test_strips_xml_fence_and_files_wrapper() {
        let raw = "```xml\n<files>\n<file path=\"src/a.ts\">\nconst a = 1;\n</file>\n</files>\n```";
        assert_eq!(clean(raw), "<file path=\"src/a.ts\">\nconst a = 1;");
    }

    #[test]
    fn test_lone_code_block_is_untouched() {
        let raw = "```ts\n// src/a.ts\nconst a = 1;\n```";
        assert_eq!(clean(raw), raw);
    }

    #[test]
    fn test_collapses_explanatory_wrapper() {
        let raw = "Here you go:\n```markdown\n### Updated file: `a.ts`\n```ts\nx\n```\n```\nEnjoy!";
        assert_eq!(clean(raw), "### Updated file: `a.ts`\n```ts\nx\n```");
    }

    #[test]
    fn test_leaves_plain_answer_with_code_block() {
        let raw = "Hello\n### Updated file: `src/a.ts`\n```ts\nconst x=1\n```\nBye";
        assert_eq!(clean(raw), raw);
    }

    #[test]
    fn test_nested_wrappers_are_stripped() {
        let raw = "<?xml version=\"1.0\"?>\n<!DOCTYPE files>\n<files><![CDATA[body]]></files>";
        assert_eq!(clean(raw), "body");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let inputs = [
            "<think>x</think>```xml\n<files>\n<file path=\"a\">\n1\n</file>\n</files>\n```",
            "Intro\n```ts\n// a.ts\nA\n```\nand\n```ts\n// b.ts\nB\n```\nbye",
            "```\n```",
            "",
            "   plain text   ",
            "text\n```",
        ];
        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "input: {:?}", input);
        }
    }
}
