use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GitSnapshot {
    pub branch: String,
    pub commit_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResponseHistoryItem {
    pub response: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_instructions: Option<String>,
}

/// Session metadata captured alongside workspace state.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub response_history: Vec<ResponseHistoryItem>,
    #[serde(default)]
    pub checked_files: Vec<String>,
    #[serde(default)]
    pub checked_websites: Vec<String>,
    #[serde(default)]
    pub active_tabs: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub timestamp: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_temporary: bool,
    #[serde(default)]
    pub is_starred: bool,
    /// Keyed by workspace root name.
    #[serde(default)]
    pub git_data: BTreeMap<String, GitSnapshot>,
    pub uses_git: bool,
    /// Roots restored from file-level backups instead of git.
    #[serde(default)]
    pub backed_up_roots: Vec<String>,
    #[serde(flatten)]
    pub session: SessionSnapshot,
}
