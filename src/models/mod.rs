pub mod checkpoint;

pub use checkpoint::{Checkpoint, GitSnapshot, ResponseHistoryItem, SessionSnapshot};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The encoding a model used to describe one file change.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EditFormat {
    Whole,
    Truncated,
    Diff,
    BeforeAfter,
}

impl EditFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditFormat::Whole => "whole",
            EditFormat::Truncated => "truncated",
            EditFormat::Diff => "diff",
            EditFormat::BeforeAfter => "before_after",
        }
    }
}

/// One search/replace pair. Pairs are applied in order against the evolving content.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchReplaceBlock {
    pub search: String,
    pub replace: String,
}

/// Payload of a parsed edit. The variant always matches the edit's format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum EditPayload {
    Whole { content: String },
    Truncated { content: String },
    Diff { patch: String },
    BeforeAfter { blocks: Vec<SearchReplaceBlock> },
}

impl EditPayload {
    pub fn format(&self) -> EditFormat {
        match self {
            EditPayload::Whole { .. } => EditFormat::Whole,
            EditPayload::Truncated { .. } => EditFormat::Truncated,
            EditPayload::Diff { .. } => EditFormat::Diff,
            EditPayload::BeforeAfter { .. } => EditFormat::BeforeAfter,
        }
    }
}

/// A file-level instruction extracted from a response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ParsedEdit {
    pub file_path: String,
    pub workspace_name: Option<String>,
    pub payload: EditPayload,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub old_path: Option<String>,
}

impl ParsedEdit {
    pub fn edit_format(&self) -> EditFormat {
        self.payload.format()
    }

    /// Key used to serialize writes to the same target.
    pub fn key(&self) -> EditKey {
        EditKey {
            file_path: self.file_path.clone(),
            workspace_name: self.workspace_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EditKey {
    pub file_path: String,
    pub workspace_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RelevantFilesItem {
    pub file_paths: Vec<String>,
}

/// An ordered piece of a parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Relevant(RelevantFilesItem),
    Edit(ParsedEdit),
}

/// How a failed structural patch was recovered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffFallbackMethod {
    Recount,
    SearchAndReplace,
}

impl DiffFallbackMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffFallbackMethod::Recount => "recount",
            DiffFallbackMethod::SearchAndReplace => "search_and_replace",
        }
    }
}

/// A parsed edit bound to disk, with the content it would produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInPreview {
    pub edit: ParsedEdit,
    pub absolute_path: PathBuf,
    pub old_absolute_path: Option<PathBuf>,
    pub original_content: Option<String>,
    pub proposed_content: String,
    pub is_checked: bool,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub is_fallback: bool,
    pub diff_fallback_method: Option<DiffFallbackMethod>,
    pub is_replaced: bool,
}

/// One top-level folder of the workspace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    pub name: String,
    pub absolute_path: PathBuf,
}

impl WorkspaceRoot {
    pub fn new(name: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        WorkspaceRoot {
            name: name.into(),
            absolute_path: absolute_path.into(),
        }
    }
}
