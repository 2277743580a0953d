//! Splits a cleaned response into ordered text, relevant-files and edit segments.

use super::fence;
use super::formats::{
    build_payload, comment_path_hint, looks_like_file_path, normalize_path_token,
    split_workspace_prefix,
};
use crate::errors::EngineError;
use crate::models::{EditPayload, ParsedEdit, RelevantFilesItem, Segment};
use regex::Regex;
use std::sync::OnceLock;

fn file_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<files?\s+([^>]*?\bpath\s*=\s*["'][^"']+["'][^>]*?)(/?)>"#)
            .expect("file tag regex")
    })
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("attribute regex")
    })
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*#{1,6}\s+(?:\*\*)?(new|created|updated|modified|changed|deleted|removed|renamed|moved)\s+file\s*(?:\*\*)?\s*:?\s*(?:\*\*)?\s*(.+?)\s*$",
        )
        .expect("heading regex")
    })
}

fn bare_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:#{1,6}\s+)?(?:\*\*)?(?:`([^`\s]+)`|\*\*([^*\s]+)\*\*)(?:\*\*)?:?\s*$")
            .expect("bare path regex")
    })
}

fn rename_separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*(?:->|→|=>)\s*|\s+to\s+").expect("rename separator regex"))
}

/// Intent declared by the heading or tag naming a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    New,
    Updated,
    Deleted,
    Renamed,
}

impl Intent {
    fn from_verb(verb: &str) -> Self {
        match verb.to_ascii_lowercase().as_str() {
            "new" | "created" => Intent::New,
            "deleted" | "removed" => Intent::Deleted,
            "renamed" | "moved" => Intent::Renamed,
            _ => Intent::Updated,
        }
    }

    /// Deleted and renamed files are complete without a body.
    fn stands_alone(&self) -> bool {
        matches!(self, Intent::Deleted | Intent::Renamed)
    }
}

#[derive(Debug, Clone)]
struct PendingHeader<'a> {
    path: String,
    old_path: Option<String>,
    intent: Intent,
    line: usize,
    raw: &'a str,
}

/// Segments plus the blocks that had to be degraded to text.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<EngineError>,
}

/// Parses cleaned response text into ordered segments.
pub fn parse(cleaned: &str) -> Vec<Segment> {
    parse_with_diagnostics(cleaned).segments
}

/// Like [`parse`], also reporting every block that degraded to text.
pub fn parse_with_diagnostics(cleaned: &str) -> ParseOutput {
    let mut parser = SegmentParser::new(cleaned);
    parser.run();
    ParseOutput {
        segments: parser.segments,
        diagnostics: parser.diagnostics,
    }
}

struct SegmentParser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    text: Vec<&'a str>,
    pending: Option<PendingHeader<'a>>,
    segments: Vec<Segment>,
    diagnostics: Vec<EngineError>,
}

impl<'a> SegmentParser<'a> {
    fn new(cleaned: &'a str) -> Self {
        SegmentParser {
            lines: cleaned.lines().collect(),
            pos: 0,
            text: Vec::new(),
            pending: None,
            segments: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(&mut self) {
        self.handle_relevant_files();

        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            let trimmed = line.trim();

            if trimmed == "<files>" || trimmed == "</files>" {
                self.pos += 1;
            } else if let Some(caps) = file_tag_re().captures(line) {
                let (start, end) = match caps.get(0) {
                    Some(m) => (m.start(), m.end()),
                    None => (0, line.len()),
                };
                let attributes = caps.get(1).map_or("", |m| m.as_str());
                let self_closing = caps.get(2).is_some_and(|m| !m.as_str().is_empty());
                self.handle_file_tag(start, end, attributes, self_closing);
            } else if let Some(caps) = heading_re().captures(line) {
                let verb = caps.get(1).map_or("", |m| m.as_str());
                let rest = caps.get(2).map_or("", |m| m.as_str());
                self.handle_heading(Intent::from_verb(verb), rest);
            } else if trimmed.is_empty() {
                if self.pending.is_none() {
                    self.text.push(line);
                }
                self.pos += 1;
            } else if fence::is_fence(line) {
                self.handle_fence();
            } else if self.is_raw_diff_start() {
                self.flush_pending();
                self.handle_raw_diff();
            } else if let Some(path) = self.bare_path_before_fence(line) {
                self.flush_pending();
                self.pending = Some(PendingHeader {
                    path,
                    old_path: None,
                    intent: Intent::Updated,
                    line: self.pos,
                    raw: line,
                });
                self.pos += 1;
            } else {
                self.flush_pending();
                self.text.push(line);
                self.pos += 1;
            }
        }

        self.flush_pending();
        self.flush_text();
    }

    /// Consumes a leading `**Relevant files:**` list.
    fn handle_relevant_files(&mut self) {
        let Some(start) = self.lines.iter().position(|l| !l.trim().is_empty()) else {
            return;
        };
        if !self.lines[start].trim().eq_ignore_ascii_case("**relevant files:**") {
            return;
        }

        let mut file_paths = Vec::new();
        let mut cursor = start + 1;
        while cursor < self.lines.len() {
            let trimmed = self.lines[cursor].trim();
            if trimmed.is_empty() {
                cursor += 1;
                continue;
            }
            let Some(item) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            else {
                break;
            };
            let path = normalize_path_token(item);
            if !path.is_empty() {
                file_paths.push(path);
            }
            cursor += 1;
        }

        if file_paths.is_empty() {
            log::debug!("Relevant files heading without any paths, parsing as text");
            return;
        }
        self.text.extend_from_slice(&self.lines[..start]);
        self.flush_text();
        self.segments
            .push(Segment::Relevant(RelevantFilesItem { file_paths }));
        self.pos = cursor;
    }

    fn handle_heading(&mut self, intent: Intent, rest: &str) {
        self.flush_pending();
        let line = self.lines[self.pos];

        let (path, old_path) = if intent == Intent::Renamed {
            let parts: Vec<&str> = rename_separator_re().splitn(rest, 2).collect();
            if parts.len() == 2 {
                (
                    normalize_path_token(parts[1]),
                    Some(normalize_path_token(parts[0])),
                )
            } else {
                (normalize_path_token(rest), None)
            }
        } else {
            (normalize_path_token(rest), None)
        };

        if path.is_empty() {
            self.degrade(self.pos, "heading names no file");
            self.text.push(line);
        } else {
            self.pending = Some(PendingHeader {
                path,
                old_path,
                intent,
                line: self.pos,
                raw: line,
            });
        }
        self.pos += 1;
    }

    /// A line naming only a path, directly followed by a code fence.
    fn bare_path_before_fence(&self, line: &str) -> Option<String> {
        let caps = bare_path_re().captures(line)?;
        let token = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let path = normalize_path_token(token);
        if !(path.contains('/') || looks_like_file_path(&path)) {
            return None;
        }
        let next = self.lines[self.pos + 1..]
            .iter()
            .find(|l| !l.trim().is_empty())?;
        fence::is_fence(next).then_some(path)
    }

    fn handle_fence(&mut self) {
        let open = self.pos;
        let info = fence::fence_info(self.lines[open]).unwrap_or("").to_string();
        let close = fence::closing_fence(&self.lines, open);
        let end = close.unwrap_or(self.lines.len());
        let next = close.map_or(self.lines.len(), |c| c + 1);
        let mut body: Vec<&str> = self.lines[open + 1..end].to_vec();

        let header = self.pending.take();
        let (path, old_path, intent) = if let Some(header) = header {
            strip_matching_hint(&mut body, &header.path);
            (header.path, header.old_path, header.intent)
        } else if let Some(path) = path_from_info(&info) {
            strip_matching_hint(&mut body, &path);
            (path, None, Intent::Updated)
        } else if let Some(path) = take_comment_hint(&mut body) {
            (path, None, Intent::Updated)
        } else if let Some(diff) = diff_header_paths(&body) {
            self.flush_text();
            self.push_edit(diff_edit(&body, &diff), &diff.path);
            self.pos = next;
            return;
        } else {
            self.degrade(open, "code block without a file path");
            self.text.extend_from_slice(&self.lines[open..next.min(self.lines.len())]);
            self.pos = next;
            return;
        };

        let content = join_body(&body);
        let edit = build_edit(&path, old_path.as_deref(), intent, &content);
        self.flush_text();
        self.push_edit(edit, &path);
        self.pos = next;
    }

    fn handle_file_tag(&mut self, start: usize, end: usize, attributes: &str, self_closing: bool) {
        self.flush_pending();
        let first = self.pos;
        let line = self.lines[first];
        let before = &line[..start];

        let attrs = parse_attributes(attributes);
        let path = attrs
            .iter()
            .find(|(k, _)| k == "path")
            .map(|(_, v)| normalize_path_token(v))
            .unwrap_or_default();
        let old_path = attrs
            .iter()
            .find(|(k, _)| k == "old_path" || k == "from")
            .map(|(_, v)| normalize_path_token(v));
        let intent = match attrs.iter().find(|(k, _)| k == "action").map(|(_, v)| v.as_str()) {
            Some(action) => match action.to_ascii_lowercase().as_str() {
                "delete" | "deleted" | "remove" => Intent::Deleted,
                "rename" | "renamed" | "move" => Intent::Renamed,
                "new" | "create" | "add" => Intent::New,
                _ => Intent::Updated,
            },
            None if old_path.is_some() => Intent::Renamed,
            None => Intent::Updated,
        };

        let mut body = String::new();
        if self_closing {
            self.pos += 1;
        } else {
            let rest = &line[end..];
            if let Some(close) = rest.find("</file>") {
                body.push_str(&rest[..close]);
                self.pos += 1;
            } else {
                body.push_str(rest);
                self.pos += 1;
                while self.pos < self.lines.len() {
                    let current = self.lines[self.pos];
                    self.pos += 1;
                    if let Some(close) = current.find("</file>") {
                        body.push('\n');
                        body.push_str(&current[..close]);
                        break;
                    }
                    body.push('\n');
                    body.push_str(current);
                }
            }
        }

        if path.is_empty() {
            self.degrade(first, "file tag with an empty path");
            self.text.extend_from_slice(&self.lines[first..self.pos]);
            return;
        }
        if !before.trim().is_empty() {
            self.text.push(before);
        }

        let content = unwrap_tag_body(&body, &path);
        let edit = build_edit(&path, old_path.as_deref(), intent, &content);
        self.flush_text();
        self.push_edit(edit, &path);
    }

    fn is_raw_diff_start(&self) -> bool {
        let line = self.lines[self.pos];
        if line.starts_with("diff --git ") {
            return true;
        }
        line.starts_with("--- ")
            && self
                .lines
                .get(self.pos + 1)
                .is_some_and(|next| next.starts_with("+++ "))
    }

    /// Consumes one unfenced unified diff.
    fn handle_raw_diff(&mut self) {
        let start = self.pos;
        let mut cursor = start + 1;
        while cursor < self.lines.len() {
            let line = self.lines[cursor];
            if line.starts_with("diff --git ") {
                break;
            }
            // A removed `-- comment` line also starts with `--- `; only a
            // `---`/`+++` pair opens the next file.
            if line.starts_with("--- ")
                && self
                    .lines
                    .get(cursor + 1)
                    .is_some_and(|next| next.starts_with("+++ "))
                && self.lines[start..cursor].iter().any(|l| l.starts_with("@@"))
            {
                break;
            }
            if line.is_empty() {
                let continues = self
                    .lines
                    .get(cursor + 1)
                    .is_some_and(|next| is_diff_line(next) && !next.starts_with("diff --git "));
                if !continues {
                    break;
                }
            } else if !is_diff_line(line) {
                break;
            }
            cursor += 1;
        }

        let body: Vec<&str> = self.lines[start..cursor].to_vec();
        match diff_header_paths(&body) {
            Some(diff) => {
                self.flush_text();
                self.push_edit(diff_edit(&body, &diff), &diff.path);
            }
            None => {
                self.degrade(start, "diff without a target path");
                self.text.extend_from_slice(&body);
            }
        }
        self.pos = cursor;
    }

    /// Resolves a pending header that was not followed by a code block.
    fn flush_pending(&mut self) {
        let Some(header) = self.pending.take() else {
            return;
        };
        if header.intent.stands_alone() {
            let edit = build_edit(&header.path, header.old_path.as_deref(), header.intent, "");
            self.flush_text();
            self.push_edit(edit, &header.path);
        } else {
            self.degrade(header.line, "file heading without a code block");
            self.text.push(header.raw);
        }
    }

    /// Sets the workspace-scoped path on `edit` and appends it.
    fn push_edit(&mut self, mut edit: ParsedEdit, raw_path: &str) {
        let (workspace_name, file_path) = split_workspace_prefix(raw_path);
        edit.workspace_name = workspace_name;
        edit.file_path = file_path;
        if let Some(old) = edit.old_path.take() {
            edit.old_path = Some(split_workspace_prefix(&old).1);
        }
        log::debug!(
            "Parsed {} edit for {}",
            edit.edit_format().as_str(),
            edit.file_path
        );
        self.segments.push(Segment::Edit(edit));
    }

    fn flush_text(&mut self) {
        let joined = self.text.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            self.segments.push(Segment::Text(trimmed.to_string()));
        }
        self.text.clear();
    }

    fn degrade(&mut self, line: usize, reason: &str) {
        log::debug!("Block at line {} kept as text: {}", line + 1, reason);
        self.diagnostics.push(EngineError::ParseAmbiguous {
            line: line + 1,
            reason: reason.to_string(),
        });
    }
}

fn build_edit(path: &str, old_path: Option<&str>, intent: Intent, body: &str) -> ParsedEdit {
    let payload = if intent == Intent::Deleted {
        EditPayload::Whole {
            content: String::new(),
        }
    } else {
        build_payload(body)
    };
    let is_renamed = intent == Intent::Renamed && old_path.is_some();
    ParsedEdit {
        file_path: path.to_string(),
        workspace_name: None,
        payload,
        is_new: intent == Intent::New,
        is_deleted: intent == Intent::Deleted,
        is_renamed,
        old_path: if is_renamed {
            old_path.map(str::to_string)
        } else {
            None
        },
    }
}

fn join_body(body: &[&str]) -> String {
    body.join("\n").trim_matches('\n').to_string()
}

/// Removes a first-line path comment repeating an already-known path.
fn strip_matching_hint(body: &mut Vec<&str>, path: &str) {
    let Some(first) = body.iter().position(|l| !l.trim().is_empty()) else {
        return;
    };
    if let Some(hint) = comment_path_hint(body[first]) {
        if hint == path || path.ends_with(&format!("/{}", hint)) || hint.ends_with(path) {
            body.drain(..=first);
        }
    }
}

/// Takes a first-line path comment as the block's path.
fn take_comment_hint(body: &mut Vec<&str>) -> Option<String> {
    let first = body.iter().position(|l| !l.trim().is_empty())?;
    let hint = comment_path_hint(body[first])?;
    body.drain(..=first);
    Some(hint)
}

/// Reads `lang:path` or `lang path` fence info strings.
fn path_from_info(info: &str) -> Option<String> {
    let candidate = if let Some((_, rest)) = info.split_once(char::is_whitespace) {
        rest.trim()
    } else if let Some((_, rest)) = info.split_once(':') {
        rest.trim()
    } else {
        return None;
    };
    let candidate = candidate.strip_prefix("path=").unwrap_or(candidate);
    let path = normalize_path_token(candidate);
    (!path.is_empty() && (path.contains('/') || looks_like_file_path(&path))).then_some(path)
}

fn parse_attributes(attributes: &str) -> Vec<(String, String)> {
    attribute_re()
        .captures_iter(attributes)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some((key, value))
        })
        .collect()
}

/// Strips CDATA and a code fence wrapping a tag body.
fn unwrap_tag_body(body: &str, path: &str) -> String {
    let mut content = body.trim_matches(|c| c == '\n' || c == '\r').to_string();
    let trimmed = content.trim();
    if let Some(inner) = trimmed.strip_prefix("<![CDATA[") {
        content = inner.strip_suffix("]]>").unwrap_or(inner).to_string();
    }

    let mut lines: Vec<&str> = content.lines().collect();
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.first().is_some_and(|l| fence::is_fence(l)) {
        let close = fence::closing_fence(&lines, 0);
        let end = close.unwrap_or(lines.len());
        lines = lines[1..end].to_vec();
    }
    strip_matching_hint(&mut lines, path);
    join_body(&lines)
}

fn is_diff_line(line: &str) -> bool {
    const PREFIXES: [&str; 13] = [
        "diff --git ",
        "index ",
        "--- ",
        "+++ ",
        "@@",
        " ",
        "+",
        "-",
        "\\",
        "new file mode",
        "deleted file mode",
        "rename from ",
        "rename to ",
    ];
    line.is_empty() || PREFIXES.iter().any(|p| line.starts_with(p)) || line.starts_with("similarity index")
}

struct DiffPaths {
    path: String,
    old_path: Option<String>,
    is_new: bool,
    is_deleted: bool,
}

/// Reads the target path from `---`/`+++` (or `rename`) headers.
fn diff_header_paths(body: &[&str]) -> Option<DiffPaths> {
    let mut minus = None;
    let mut plus = None;
    let mut rename_from = None;
    let mut rename_to = None;
    for line in body {
        if let Some(rest) = line.strip_prefix("--- ") {
            if minus.is_none() {
                minus = Some(header_path(rest, "a/"));
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            if plus.is_none() {
                plus = Some(header_path(rest, "b/"));
            }
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            rename_from = Some(normalize_path_token(rest));
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            rename_to = Some(normalize_path_token(rest));
        } else if line.starts_with("@@") {
            break;
        }
    }

    let minus = minus.flatten();
    let plus = plus.flatten();
    let is_new = plus.is_some() && minus.is_none() && body.iter().any(|l| l.starts_with("--- /dev/null"));
    let is_deleted = minus.is_some() && plus.is_none() && body.iter().any(|l| l.starts_with("+++ /dev/null"));

    if let Some(to) = rename_to {
        return Some(DiffPaths {
            path: to,
            old_path: rename_from,
            is_new: false,
            is_deleted: false,
        });
    }

    let path = plus.clone().or_else(|| minus.clone())?;
    let old_path = match (&minus, &plus) {
        (Some(old), Some(new)) if old != new => Some(old.clone()),
        _ => None,
    };
    Some(DiffPaths {
        path,
        old_path,
        is_new,
        is_deleted,
    })
}

fn diff_edit(body: &[&str], diff: &DiffPaths) -> ParsedEdit {
    ParsedEdit {
        file_path: diff.path.clone(),
        workspace_name: None,
        payload: EditPayload::Diff {
            patch: body.join("\n"),
        },
        is_new: diff.is_new,
        is_deleted: diff.is_deleted,
        is_renamed: diff.old_path.is_some(),
        old_path: diff.old_path.clone(),
    }
}

/// Path from a diff header, `None` for `/dev/null`.
fn header_path(rest: &str, side_prefix: &str) -> Option<String> {
    let raw = rest.split('\t').next().unwrap_or(rest).trim();
    if raw == "/dev/null" {
        return None;
    }
    let raw = raw.strip_prefix(side_prefix).unwrap_or(raw);
    let path = normalize_path_token(raw);
    (!path.is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditFormat, SearchReplaceBlock};
    use crate::response::cleaner::clean;
    use pretty_assertions::assert_eq;

    fn edits(segments: &[Segment]) -> Vec<&ParsedEdit> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Edit(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_heading_with_code_block() {
        let segments = parse("Hello\n### Updated file: `src/a.ts`\n```ts\nconst x=1\n```\n");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], Segment::Text("Hello".to_string()));
        match &segments[1] {
            Segment::Edit(edit) => {
                assert_eq!(edit.file_path, "src/a.ts");
                assert_eq!(edit.edit_format(), EditFormat::Whole);
                assert_eq!(
                    edit.payload,
                    EditPayload::Whole {
                        content: "const x=1".to_string()
                    }
                );
                assert!(!edit.is_new);
            }
            other => panic!("expected edit, got {:?}", other),
        }
    }

    #[test]
    fn test_relevant_files_list() {
        let segments = parse("**Relevant files:**\n- `src/a.ts`\n- `src/b.ts`\n");
        assert_eq!(
            segments,
            vec![Segment::Relevant(RelevantFilesItem {
                file_paths: vec!["src/a.ts".to_string(), "src/b.ts".to_string()]
            })]
        );
    }

    #[test]
    fn test_relevant_heading_without_items_falls_through() {
        let segments = parse("**Relevant files:**\nNone really.");
        assert_eq!(
            segments,
            vec![Segment::Text("**Relevant files:**\nNone really.".to_string())]
        );
    }

    #[test]
    fn test_relevant_files_followed_by_edits() {
        let input = "**RELEVANT FILES:**\n* src/a.ts\n\nHere is the change.\n```ts\n// src/a.ts\nlet a = 2;\n```";
        let segments = parse(input);
        assert!(matches!(&segments[0], Segment::Relevant(r) if r.file_paths == vec!["src/a.ts"]));
        assert_eq!(segments[1], Segment::Text("Here is the change.".to_string()));
        assert_eq!(edits(&segments)[0].file_path, "src/a.ts");
    }

    #[test]
    fn test_cleaned_xml_wrapper_parses_file_tags() {
        let raw = "```xml\n<files>\n<file path=\"src/a.ts\">\n<![CDATA[\nconst a = 1;\n]]>\n</file>\n<file path=\"src/b.ts\">\nconst b = 2;\n</file>\n</files>\n```";
        let segments = parse(&clean(raw));
        let found = edits(&segments);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].file_path, "src/a.ts");
        assert_eq!(
            found[0].payload,
            EditPayload::Whole {
                content: "const a = 1;".to_string()
            }
        );
        assert_eq!(found[1].file_path, "src/b.ts");
        assert_eq!(
            found[1].payload,
            EditPayload::Whole {
                content: "const b = 2;".to_string()
            }
        );
    }

    #[test]
    fn test_file_tag_actions() {
        let input = "<file path=\"old.rs\" action=\"delete\"/>\n<file path=\"new.rs\" old_path=\"prev.rs\">\nfn a() {}\n</file>";
        let segments = parse(input);
        let found = edits(&segments);
        assert_eq!(found.len(), 2);
        assert!(found[0].is_deleted);
        assert_eq!(found[0].file_path, "old.rs");
        assert!(found[1].is_renamed);
        assert_eq!(found[1].old_path.as_deref(), Some("prev.rs"));
    }

    #[test]
    fn test_comment_hint_inside_fence() {
        let segments = parse("Change:\n```python\n# app/main.py\nprint('hi')\n```");
        let found = edits(&segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "app/main.py");
        assert_eq!(
            found[0].payload,
            EditPayload::Whole {
                content: "print('hi')".to_string()
            }
        );
    }

    #[test]
    fn test_fence_without_path_stays_text() {
        let output = parse_with_diagnostics("Run this:\n```sh\ncargo test\n```\nDone.");
        assert!(edits(&output.segments).is_empty());
        assert_eq!(
            output.segments,
            vec![Segment::Text("Run this:\n```sh\ncargo test\n```\nDone.".to_string())]
        );
        assert!(matches!(
            output.diagnostics[0],
            EngineError::ParseAmbiguous { line: 2, .. }
        ));
    }

    #[test]
    fn test_malformed_block_does_not_discard_siblings() {
        let input = "### Updated file: `a.ts`\nno code here\n### New file: `b.ts`\n```ts\nexport const b = 1;\n```";
        let output = parse_with_diagnostics(input);
        let found = edits(&output.segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "b.ts");
        assert!(found[0].is_new);
        assert_eq!(output.diagnostics.len(), 1);
    }

    #[test]
    fn test_deleted_and_renamed_headings() {
        let input = "### Deleted file: `src/old.ts`\n\n### Renamed file: `src/a.ts` -> `src/b.ts`\nThat's all.";
        let segments = parse(input);
        let found = edits(&segments);
        assert_eq!(found.len(), 2);
        assert!(found[0].is_deleted);
        assert_eq!(found[0].file_path, "src/old.ts");
        assert!(found[1].is_renamed);
        assert_eq!(found[1].file_path, "src/b.ts");
        assert_eq!(found[1].old_path.as_deref(), Some("src/a.ts"));
        assert_eq!(segments.last(), Some(&Segment::Text("That's all.".to_string())));
    }

    #[test]
    fn test_diff_block_format() {
        let input = "### Updated file: `src/a.ts`\n```diff\n--- a/src/a.ts\n+++ b/src/a.ts\n@@ -1 +1 @@\n-a\n+b\n```";
        let segments = parse(input);
        let found = edits(&segments);
        assert_eq!(found[0].edit_format(), EditFormat::Diff);
    }

    #[test]
    fn test_fenced_diff_without_heading_uses_header_path() {
        let input = "```diff\n--- a/src/a.ts\n+++ b/src/a.ts\n@@ -1 +1 @@\n-a\n+b\n```";
        let found_segments = parse(input);
        let found = edits(&found_segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "src/a.ts");
        assert!(!found[0].is_renamed);
    }

    #[test]
    fn test_raw_diff_outside_fence() {
        let input = "Patch:\ndiff --git a/x.rs b/x.rs\n--- /dev/null\n+++ b/x.rs\n@@ -0,0 +1 @@\n+fn x() {}\nThanks";
        let segments = parse(input);
        let found = edits(&segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "x.rs");
        assert!(found[0].is_new);
        assert_eq!(segments.last(), Some(&Segment::Text("Thanks".to_string())));
    }

    #[test]
    fn test_raw_diff_removing_sql_comment_stays_whole() {
        let input = "--- a/q.sql\n+++ b/q.sql\n@@ -1,3 +1,2 @@\n--- old comment\n select 1;\n-select 2;\n";
        let segments = parse(input);
        assert_eq!(segments.len(), 1);
        let found = edits(&segments);
        assert_eq!(found[0].file_path, "q.sql");
        match &found[0].payload {
            EditPayload::Diff { patch } => {
                assert!(patch.contains("--- old comment"));
                assert!(patch.contains("-select 2;"));
            }
            other => panic!("expected diff, got {:?}", other),
        }
    }

    #[test]
    fn test_file_tag_without_path_is_kept_verbatim() {
        let input = "Intro <file path=\" \">\nbody line\n</file>\nAfter";
        let output = parse_with_diagnostics(input);
        assert_eq!(
            output.segments,
            vec![Segment::Text(
                "Intro <file path=\" \">\nbody line\n</file>\nAfter".to_string()
            )]
        );
        assert!(matches!(
            output.diagnostics[0],
            EngineError::ParseAmbiguous { line: 1, .. }
        ));
    }

    #[test]
    fn test_before_after_blocks() {
        let input = "### Updated file: `lib.rs`\n```rust\n<<<<<<< SEARCH\nfn a() {}\n=======\nfn b() {}\n>>>>>>> REPLACE\n```";
        let segments = parse(input);
        let found = edits(&segments);
        assert_eq!(
            found[0].payload,
            EditPayload::BeforeAfter {
                blocks: vec![SearchReplaceBlock {
                    search: "fn a() {}".to_string(),
                    replace: "fn b() {}".to_string()
                }]
            }
        );
    }

    #[test]
    fn test_truncated_block() {
        let input = "```rust\n// src/lib.rs\nfn a() {}\n// ... rest of the code unchanged\n```";
        let segments = parse(input);
        assert_eq!(edits(&segments)[0].edit_format(), EditFormat::Truncated);
    }

    #[test]
    fn test_workspace_prefixed_path() {
        let segments = parse("### Updated file: `backend:src/main.rs`\n```rust\nfn main() {}\n```");
        let found = edits(&segments);
        assert_eq!(found[0].workspace_name.as_deref(), Some("backend"));
        assert_eq!(found[0].file_path, "src/main.rs");
    }

    #[test]
    fn test_fence_info_path_and_bare_path_line() {
        let segments = parse("```ts:src/a.ts\nlet a;\n```\n`src/b.ts`\n```ts\nlet b;\n```");
        let found = edits(&segments);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].file_path, "src/a.ts");
        assert_eq!(found[1].file_path, "src/b.ts");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let segments = parse("### New file: `a.py`\n```python\nprint(1)\nprint(2)");
        let found = edits(&segments);
        assert_eq!(
            found[0].payload,
            EditPayload::Whole {
                content: "print(1)\nprint(2)".to_string()
            }
        );
    }

    #[test]
    fn test_heading_repeated_in_comment_is_stripped() {
        let segments = parse("### Updated file: `src/a.ts`\n```ts\n// src/a.ts\nlet a = 1;\n```");
        assert_eq!(
            edits(&segments)[0].payload,
            EditPayload::Whole {
                content: "let a = 1;".to_string()
            }
        );
    }

    #[test]
    fn test_exactly_one_format_per_edit() {
        let input = "```ts\n// a.ts\n<<<<<<< SEARCH\n// ...\n=======\nx\n>>>>>>> REPLACE\n```";
        let segments = parse(input);
        let found = edits(&segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].edit_format(), EditFormat::BeforeAfter);
    }
}
