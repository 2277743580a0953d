//! Edit-format detection and the small lexical helpers the segment parser
//! uses to recognise file paths.

use crate::models::{EditFormat, EditPayload, SearchReplaceBlock};
use regex::Regex;
use std::sync::OnceLock;

/// Longest extension accepted by the comment path hint.
const MAX_EXTENSION_LEN: usize = 10;

/// Longest token accepted as a comment path hint.
const MAX_HINT_LEN: usize = 160;

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@@ .*@@").expect("hunk header regex"))
}

fn truncation_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?://|#|--|/\*|<!--|\{/\*|;)\s*(?:\.\.\.|…|.*(?:\.\.\.|…|\bunchanged\b|\brest of (?:the )?(?:code|file|implementation|function|class)\b|\bexisting code\b))",
        )
        .expect("truncation marker regex")
    })
}

fn comment_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?://|#|--|/\*|\*|<!--)\s*(?:[Ff]ile(?:name)?:\s*)?(\S+?)\s*(?:\*/|-->)?\s*$")
            .expect("comment hint regex")
    })
}

/// Picks the single format a block body is encoded in.
///
/// Signatures are checked in priority order (diff, search/replace,
/// truncation markers) so exactly one format is chosen.
pub fn detect_format(body: &str) -> EditFormat {
    if is_diff_body(body) {
        EditFormat::Diff
    } else if is_search_replace_body(body) {
        EditFormat::BeforeAfter
    } else if body.lines().any(is_truncation_marker) {
        EditFormat::Truncated
    } else {
        EditFormat::Whole
    }
}

/// Builds the payload for `body` in the detected format.
pub fn build_payload(body: &str) -> EditPayload {
    match detect_format(body) {
        EditFormat::Diff => EditPayload::Diff {
            patch: body.to_string(),
        },
        EditFormat::BeforeAfter => EditPayload::BeforeAfter {
            blocks: parse_search_replace_blocks(body),
        },
        EditFormat::Truncated => EditPayload::Truncated {
            content: body.to_string(),
        },
        EditFormat::Whole => EditPayload::Whole {
            content: body.to_string(),
        },
    }
}

pub fn is_diff_body(body: &str) -> bool {
    let first = body.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first.starts_with("--- ") || first.starts_with("+++ ") || first.starts_with("diff --git ") {
        return true;
    }
    body.lines().any(|line| hunk_header_re().is_match(line))
}

fn is_search_start(line: &str) -> bool {
    line.trim_start().starts_with("<<<<<<<")
}

fn is_divider(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 7 && trimmed.chars().all(|c| c == '=')
}

fn is_replace_end(line: &str) -> bool {
    line.trim_start().starts_with(">>>>>>>")
}

pub fn is_search_replace_body(body: &str) -> bool {
    let mut seen_start = false;
    for line in body.lines() {
        if is_search_start(line) {
            seen_start = true;
        } else if seen_start && is_divider(line) {
            return true;
        }
    }
    false
}

#[derive(PartialEq)]
enum BlockState {
    Outside,
    Search,
    Replace,
}

/// Splits a body into ordered search/replace pairs.
///
/// A pair cut off after its divider (streamed output) is kept; one cut off
/// before the divider is dropped.
pub fn parse_search_replace_blocks(body: &str) -> Vec<SearchReplaceBlock> {
    let mut blocks = Vec::new();
    let mut state = BlockState::Outside;
    let mut search: Vec<&str> = Vec::new();
    let mut replace: Vec<&str> = Vec::new();

    for line in body.lines() {
        match state {
            BlockState::Outside => {
                if is_search_start(line) {
                    state = BlockState::Search;
                }
            }
            BlockState::Search => {
                if is_divider(line) {
                    state = BlockState::Replace;
                } else {
                    search.push(line);
                }
            }
            BlockState::Replace => {
                if is_replace_end(line) {
                    blocks.push(SearchReplaceBlock {
                        search: search.join("\n"),
                        replace: replace.join("\n"),
                    });
                    search.clear();
                    replace.clear();
                    state = BlockState::Outside;
                } else {
                    replace.push(line);
                }
            }
        }
    }

    if state == BlockState::Replace {
        log::debug!("Keeping unterminated search/replace block");
        blocks.push(SearchReplaceBlock {
            search: search.join("\n"),
            replace: replace.join("\n"),
        });
    }
    blocks
}

/// A whole-line comment standing in for elided original code.
pub fn is_truncation_marker(line: &str) -> bool {
    truncation_marker_re().is_match(line)
}

/// Extracts a path from a comment line such as `// src/lib.rs`.
///
/// The token must look like a file name: one dot in its last component and
/// a short alphanumeric extension.
pub fn comment_path_hint(line: &str) -> Option<String> {
    let caps = comment_hint_re().captures(line)?;
    let token = normalize_path_token(caps.get(1)?.as_str());
    if looks_like_file_path(&token) {
        Some(token)
    } else {
        None
    }
}

pub fn looks_like_file_path(token: &str) -> bool {
    if token.is_empty() || token.len() > MAX_HINT_LEN || token.contains("...") {
        return false;
    }
    if token.chars().any(|c| c.is_whitespace() || c == '`' || c == '"') {
        return false;
    }
    let name = token.rsplit('/').next().unwrap_or(token);
    let name = name.strip_prefix('.').unwrap_or(name);
    if name.matches('.').count() != 1 {
        return false;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Strips markdown decoration from a path token and normalises separators.
pub fn normalize_path_token(raw: &str) -> String {
    let mut token = raw.trim();
    if let Some(start) = token.find('`') {
        if let Some(len) = token[start + 1..].find('`') {
            token = &token[start + 1..start + 1 + len];
        }
    }
    let token = token
        .trim()
        .trim_matches(|c| matches!(c, '*' | '"' | '\'' | '`' | ':'))
        .trim();
    let normalized = token.replace('\\', "/");
    let mut normalized = normalized.as_str();
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest;
    }
    normalized.to_string()
}

/// Splits an explicit `Name:relative/path` workspace prefix.
///
/// Drive letters (`C:/...`) and URL schemes are not treated as prefixes.
pub fn split_workspace_prefix(path: &str) -> (Option<String>, String) {
    if let Some((name, rest)) = path.split_once(':') {
        let is_drive = name.len() == 1 && (rest.starts_with('/') || rest.starts_with('\\'));
        let is_scheme = rest.starts_with("//");
        let valid_name = !name.is_empty() && !name.contains('/') && !name.contains('\\');
        if valid_name && !is_drive && !is_scheme && !rest.is_empty() {
            return (Some(name.to_string()), rest.trim_start_matches('/').to_string());
        }
    }
    (None, path.to_string())
}
