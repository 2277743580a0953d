//! Binds raw path tokens from a response to absolute paths under a workspace root.

use crate::errors::EngineError;
use crate::models::{ParsedEdit, WorkspaceRoot};
use crate::response::formats::split_workspace_prefix;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

/// Existence check used when several roots could own a path.
pub trait PathProbe {
    fn exists(&self, path: &Path) -> bool;
}

/// Probes the real filesystem.
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Resolves `raw_path` against the workspace using the filesystem for probing.
pub fn resolve(
    raw_path: &str,
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
) -> Result<PathBuf, EngineError> {
    resolve_with_probe(raw_path, roots, origin_root, &FsProbe)
}

/// Resolution order: `origin_root`, then an explicit `Name:` prefix naming a
/// root, then the only root, then the first root where the path exists,
/// then the first root.
pub fn resolve_with_probe(
    raw_path: &str,
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
    probe: &dyn PathProbe,
) -> Result<PathBuf, EngineError> {
    let unresolvable = |workspace: Option<String>| EngineError::PathUnresolvable {
        path: raw_path.to_string(),
        workspace,
    };

    let (prefix, relative) = match split_workspace_prefix(raw_path) {
        (Some(name), rest) if roots.iter().any(|r| r.name == name) => (Some(name), rest),
        _ => (None, raw_path.to_string()),
    };

    if let Some(origin) = origin_root {
        return join_within(&origin.absolute_path, &relative)
            .ok_or_else(|| unresolvable(Some(origin.name.clone())));
    }

    if let Some(name) = prefix {
        let root = roots
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| unresolvable(Some(name.clone())))?;
        return join_within(&root.absolute_path, &relative).ok_or_else(|| unresolvable(Some(name)));
    }

    resolve_unscoped(&relative, roots, probe).ok_or_else(|| unresolvable(None))
}

/// Resolves a parsed edit, honouring the workspace name the parser split off.
pub fn resolve_edit(
    edit: &ParsedEdit,
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
) -> Result<PathBuf, EngineError> {
    resolve_scoped(&edit.file_path, edit.workspace_name.as_deref(), roots, origin_root, &FsProbe)
}

/// Like [`resolve_with_probe`] for a path whose workspace was named separately.
pub fn resolve_scoped(
    relative: &str,
    workspace_name: Option<&str>,
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
    probe: &dyn PathProbe,
) -> Result<PathBuf, EngineError> {
    match (workspace_name, origin_root) {
        (Some(name), None) => {
            let root = roots.iter().find(|r| r.name == name).ok_or_else(|| {
                EngineError::PathUnresolvable {
                    path: relative.to_string(),
                    workspace: Some(name.to_string()),
                }
            })?;
            join_within(&root.absolute_path, relative).ok_or_else(|| EngineError::PathUnresolvable {
                path: relative.to_string(),
                workspace: Some(name.to_string()),
            })
        }
        _ => resolve_with_probe(relative, roots, origin_root, probe),
    }
}

fn resolve_unscoped(relative: &str, roots: &[WorkspaceRoot], probe: &dyn PathProbe) -> Option<PathBuf> {
    let first = roots.first()?;
    if roots.len() == 1 {
        return join_within(&first.absolute_path, relative);
    }

    let candidates: Vec<PathBuf> = roots
        .iter()
        .filter_map(|root| join_within(&root.absolute_path, relative))
        .collect();
    if let Some(hit) = candidates.iter().find(|candidate| probe.exists(candidate)) {
        return Some(hit.clone());
    }

    log::debug!(
        "`{}` exists in no workspace root, defaulting to `{}`",
        relative,
        first.name
    );
    join_within(&first.absolute_path, relative)
}

/// Joins `relative` onto `root` lexically, refusing results outside `root`.
/// Absolute inputs are accepted only when they already lie under `root`.
fn join_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return candidate.starts_with(root).then(|| candidate.to_path_buf());
    }

    let mut depth = 0usize;
    let mut joined = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                joined.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(joined)
}

/// Resolves a saved context path set. Entries starting with `!` are
/// exclusions; the marker is kept on the resolved path. Entries that cannot
/// be resolved are dropped.
pub fn resolve_context_paths(
    paths: &[String],
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
) -> Vec<String> {
    paths
        .iter()
        .filter_map(|entry| {
            let (negated, raw) = match entry.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, entry.as_str()),
            };
            match resolve(raw, roots, origin_root) {
                Ok(path) => {
                    let path = path.to_string_lossy().into_owned();
                    Some(if negated { format!("!{}", path) } else { path })
                }
                Err(e) => {
                    log::warn!("Dropping context path: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Expands resolved context paths (globs allowed) into the files they select.
///
/// Inclusions act as a whitelist per root; `!` entries subtract from it.
/// Ignore files are honoured while walking.
pub fn expand_context_paths(resolved: &[String], roots: &[WorkspaceRoot]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        let mut overrides = OverrideBuilder::new(&root.absolute_path);
        let mut includes = 0usize;

        for entry in resolved {
            let (negated, path) = match entry.strip_prefix('!') {
                Some(rest) => (true, Path::new(rest)),
                None => (false, Path::new(entry.as_str())),
            };
            let Ok(relative) = path.strip_prefix(&root.absolute_path) else {
                continue;
            };
            let mut glob = relative.to_string_lossy().replace('\\', "/");
            if path.is_dir() {
                glob = if glob.is_empty() { "**".to_string() } else { format!("{}/**", glob) };
            }
            let glob = if negated { format!("!{}", glob) } else { glob };
            match overrides.add(&glob) {
                Ok(_) if !negated => includes += 1,
                Ok(_) => {}
                Err(e) => log::warn!("Invalid context pattern `{}`: {}", glob, e),
            }
        }

        if includes == 0 {
            continue;
        }
        let overrides = match overrides.build() {
            Ok(overrides) => overrides,
            Err(e) => {
                log::warn!("Could not build context patterns for `{}`: {}", root.name, e);
                continue;
            }
        };

        let walker = WalkBuilder::new(&root.absolute_path)
            .standard_filters(true)
            .require_git(false)
            .overrides(overrides)
            .build();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => log::warn!("Error walking `{}`: {}", root.name, e),
            }
        }
    }

    files.sort();
    files.dedup();
    files
}
