//! Turns parsed edits into previews: resolved paths plus the content each
//! edit would produce.

use super::reader::read_original;
use super::reconciler::Reconciler;
use crate::diff::{apply_patch, apply_search_replace, diff_stats};
use crate::errors::EngineError;
use crate::models::{DiffFallbackMethod, EditPayload, FileInPreview, ParsedEdit, WorkspaceRoot};
use crate::workspace::resolver::{resolve_edit, resolve_scoped, FsProbe};
use std::path::Path;

/// An edit that could not be previewed.
#[derive(Debug)]
pub struct PreviewFailure {
    pub edit: ParsedEdit,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct PreviewSet {
    pub previews: Vec<FileInPreview>,
    pub failures: Vec<PreviewFailure>,
}

/// Builds a preview per edit. A failing edit is reported in `failures` and
/// does not affect the others.
pub async fn build_previews<R: Reconciler>(
    edits: &[ParsedEdit],
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
    reconciler: &R,
) -> PreviewSet {
    let mut set = PreviewSet::default();
    for edit in edits {
        match build_preview(edit, roots, origin_root, reconciler).await {
            Ok(preview) => set.previews.push(preview),
            Err(error) => {
                log::warn!("Skipping `{}`: {}", edit.file_path, error);
                set.failures.push(PreviewFailure {
                    edit: edit.clone(),
                    error,
                });
            }
        }
    }
    set
}

pub async fn build_preview<R: Reconciler>(
    edit: &ParsedEdit,
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
    reconciler: &R,
) -> Result<FileInPreview, EngineError> {
    let old_absolute_path = match (&edit.old_path, edit.is_renamed) {
        (Some(old_path), true) => Some(resolve_scoped(
            old_path,
            edit.workspace_name.as_deref(),
            roots,
            origin_root,
            &FsProbe,
        )?),
        _ => None,
    };
    // An unscoped rename stays in the root its source lives in.
    let source_root = match (&old_absolute_path, origin_root, &edit.workspace_name) {
        (Some(old), None, None) => owning_root(old, roots),
        _ => None,
    };
    let absolute_path = resolve_edit(edit, roots, source_root.or(origin_root))?;

    let source_path = old_absolute_path.as_ref().unwrap_or(&absolute_path);
    let original_content = read_original(source_path).await?;
    let original = original_content.as_deref().unwrap_or("");

    let mut fallback: Option<DiffFallbackMethod> = None;
    let proposed_content = if edit.is_deleted {
        String::new()
    } else {
        match &edit.payload {
            // A rename without a body moves the file unchanged.
            EditPayload::Whole { content } if edit.is_renamed && content.is_empty() => original.to_string(),
            EditPayload::Whole { content } => with_final_newline(content, original_content.as_deref()),
            EditPayload::Truncated { content } => match &original_content {
                Some(original) => reconciler.reconcile(&edit.file_path, original, content).await?,
                None => {
                    log::warn!(
                        "`{}` is truncated but does not exist yet, writing it as given",
                        edit.file_path
                    );
                    with_final_newline(content, None)
                }
            },
            EditPayload::Diff { patch } => {
                let outcome = apply_patch(original, patch).map_err(|reason| EngineError::PatchApplyFailed {
                    path: edit.file_path.clone(),
                    reason,
                })?;
                fallback = outcome.fallback;
                outcome.content
            }
            EditPayload::BeforeAfter { blocks } => {
                apply_search_replace(original, blocks).map_err(|reason| EngineError::PatchApplyFailed {
                    path: edit.file_path.clone(),
                    reason,
                })?
            }
        }
    };

    let stats = diff_stats(original, &proposed_content);
    let is_replaced = matches!(edit.payload, EditPayload::Whole { .. })
        && original_content.is_some()
        && !edit.is_deleted
        && !(edit.is_renamed && proposed_content == original);

    Ok(FileInPreview {
        edit: edit.clone(),
        absolute_path,
        old_absolute_path,
        original_content,
        proposed_content,
        is_checked: true,
        lines_added: stats.lines_added,
        lines_removed: stats.lines_removed,
        is_fallback: fallback.is_some(),
        diff_fallback_method: fallback,
        is_replaced,
    })
}

/// Fenced bodies lose their final newline; put it back unless the file
/// being replaced had none.
fn with_final_newline(content: &str, original: Option<&str>) -> String {
    let wants_newline = original.map_or(true, |o| o.is_empty() || o.ends_with('\n'));
    if wants_newline && !content.is_empty() && !content.ends_with('\n') {
        format!("{}\n", content)
    } else {
        content.to_string()
    }
}

fn owning_root<'a>(path: &Path, roots: &'a [WorkspaceRoot]) -> Option<&'a WorkspaceRoot> {
    roots
        .iter()
        .filter(|root| path.starts_with(&root.absolute_path))
        .max_by_key(|root| root.absolute_path.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_processing::reconciler::NoReconciler;
    use crate::models::SearchReplaceBlock;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn edit(path: &str, payload: EditPayload) -> ParsedEdit {
        ParsedEdit {
            file_path: path.to_string(),
            workspace_name: None,
            payload,
            is_new: false,
            is_deleted: false,
            is_renamed: false,
            old_path: None,
        }
    }

    fn workspace() -> (tempfile::TempDir, Vec<WorkspaceRoot>) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.ts"), "const x = 1;\nconst y = 2;\n").unwrap();
        let roots = vec![WorkspaceRoot::new("w", dir.path())];
        (dir, roots)
    }

    #[tokio::test]
    async fn test_whole_replacement() {
        let (dir, roots) = workspace();
        let e = edit(
            "src/a.ts",
            EditPayload::Whole {
                content: "const x = 1;\nconst y = 3;".to_string(),
            },
        );
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.absolute_path, dir.path().join("src/a.ts"));
        assert_eq!(preview.proposed_content, "const x = 1;\nconst y = 3;\n");
        assert_eq!((preview.lines_added, preview.lines_removed), (1, 1));
        assert!(preview.is_replaced);
        assert!(preview.is_checked);
        assert!(!preview.is_fallback);
    }

    #[tokio::test]
    async fn test_new_file_is_not_replaced() {
        let (_dir, roots) = workspace();
        let mut e = edit("src/new.ts", EditPayload::Whole { content: "a\nb".to_string() });
        e.is_new = true;
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.original_content, None);
        assert!(!preview.is_replaced);
        assert_eq!(preview.lines_added, 2);
    }

    #[tokio::test]
    async fn test_diff_with_fallback() {
        let (_dir, roots) = workspace();
        let e = edit(
            "src/a.ts",
            EditPayload::Diff {
                patch: "@@ -10,2 +10,2 @@\n const x = 1;\n-const y = 2;\n+const y = 20;\n".to_string(),
            },
        );
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.proposed_content, "const x = 1;\nconst y = 20;\n");
        assert!(preview.is_fallback);
        assert_eq!(preview.diff_fallback_method, Some(DiffFallbackMethod::Recount));
        assert!(!preview.is_replaced);
    }

    #[tokio::test]
    async fn test_before_after() {
        let (_dir, roots) = workspace();
        let e = edit(
            "src/a.ts",
            EditPayload::BeforeAfter {
                blocks: vec![SearchReplaceBlock {
                    search: "const y = 2;".to_string(),
                    replace: "const y = 4;".to_string(),
                }],
            },
        );
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.proposed_content, "const x = 1;\nconst y = 4;\n");
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (_dir, roots) = workspace();
        let edits = vec![
            edit(
                "src/a.ts",
                EditPayload::Diff {
                    patch: "@@ -1 +1 @@\n-not in file\n+x\n".to_string(),
                },
            ),
            edit(
                "src/a.ts",
                EditPayload::Truncated {
                    content: "const x = 1;\n// ... rest unchanged".to_string(),
                },
            ),
            edit("../escape.ts", EditPayload::Whole { content: "x".to_string() }),
            edit("src/b.ts", EditPayload::Whole { content: "ok".to_string() }),
        ];
        let set = build_previews(&edits, &roots, None, &NoReconciler).await;
        assert_eq!(set.previews.len(), 1);
        assert_eq!(set.previews[0].edit.file_path, "src/b.ts");
        assert_eq!(set.failures.len(), 3);
        assert!(matches!(set.failures[0].error, EngineError::PatchApplyFailed { .. }));
        assert!(matches!(set.failures[1].error, EngineError::ReconcileFailed { .. }));
        assert!(matches!(set.failures[2].error, EngineError::PathUnresolvable { .. }));
    }

    #[tokio::test]
    async fn test_rename_without_body_keeps_content() {
        let (dir, roots) = workspace();
        let mut e = edit("src/b.ts", EditPayload::Whole { content: String::new() });
        e.is_renamed = true;
        e.old_path = Some("src/a.ts".to_string());
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.old_absolute_path, Some(dir.path().join("src/a.ts")));
        assert_eq!(preview.proposed_content, "const x = 1;\nconst y = 2;\n");
        assert_eq!((preview.lines_added, preview.lines_removed), (0, 0));
        assert!(!preview.is_replaced);
    }

    #[tokio::test]
    async fn test_rename_stays_in_source_root() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("src")).unwrap();
        fs::write(second.path().join("src/old.ts"), "export {};\n").unwrap();
        let roots = vec![
            WorkspaceRoot::new("first", first.path()),
            WorkspaceRoot::new("second", second.path()),
        ];

        let mut e = edit("src/new.ts", EditPayload::Whole { content: String::new() });
        e.is_renamed = true;
        e.old_path = Some("src/old.ts".to_string());
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.old_absolute_path, Some(second.path().join("src/old.ts")));
        assert_eq!(preview.absolute_path, second.path().join("src/new.ts"));
        assert_eq!(preview.proposed_content, "export {};\n");
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, roots) = workspace();
        let mut e = edit("src/a.ts", EditPayload::Whole { content: String::new() });
        e.is_deleted = true;
        let preview = build_preview(&e, &roots, None, &NoReconciler).await.unwrap();
        assert_eq!(preview.proposed_content, "");
        assert_eq!(preview.lines_removed, 2);
    }
}
