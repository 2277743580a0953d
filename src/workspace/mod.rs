pub mod resolver;

pub use resolver::{
    expand_context_paths, resolve, resolve_context_paths, resolve_edit, resolve_scoped,
    resolve_with_probe, FsProbe, PathProbe,
};

use crate::models::WorkspaceRoot;

/// Parses a `--root` argument of the form `[name=]path`. Without a name the
/// directory's own name is used.
pub fn parse_root_arg(arg: &str) -> Result<WorkspaceRoot, String> {
    let (name, path) = match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() => (Some(name.to_string()), path),
        _ => (None, arg),
    };
    let absolute = std::path::absolute(path).map_err(|e| format!("invalid root `{}`: {}", path, e))?;
    let name = match name {
        Some(name) => name,
        None => absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string()),
    };
    Ok(WorkspaceRoot::new(name, absolute))
}
