//! Per-file review state for one apply.

use crate::errors::EngineError;
use crate::models::{DiffFallbackMethod, FileInPreview};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Pending,
    Accepted,
    Rejected,
    /// Accepted, and written through a textual recovery of a failed patch.
    FallbackApplied(DiffFallbackMethod),
}

impl ReviewState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewState::Pending)
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewState::Pending => write!(f, "pending"),
            ReviewState::Accepted => write!(f, "accepted"),
            ReviewState::Rejected => write!(f, "rejected"),
            ReviewState::FallbackApplied(method) => write!(f, "fallback applied ({})", method.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub preview: FileInPreview,
    pub state: ReviewState,
}

/// Lives from "preview built" until the user accepts, rejects or backs out.
#[derive(Debug)]
pub struct ReviewSession {
    items: Vec<ReviewItem>,
    created_at: i64,
}

impl ReviewSession {
    pub fn new(previews: Vec<FileInPreview>) -> Self {
        let items = previews
            .into_iter()
            .map(|mut preview| {
                preview.is_checked = true;
                ReviewItem {
                    preview,
                    state: ReviewState::Pending,
                }
            })
            .collect();
        ReviewSession {
            items,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn items(&self) -> &[ReviewItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn state(&self, index: usize) -> Result<ReviewState, EngineError> {
        self.item(index).map(|item| item.state)
    }

    /// Flips an item between included and excluded.
    pub fn toggle(&mut self, index: usize) -> Result<ReviewState, EngineError> {
        let next = match self.state(index)? {
            ReviewState::Pending | ReviewState::Accepted => ReviewState::Rejected,
            ReviewState::Rejected => ReviewState::Accepted,
            from @ ReviewState::FallbackApplied(_) => {
                return Err(EngineError::InvalidTransition {
                    index,
                    from: from.to_string(),
                })
            }
        };
        self.set(index, next);
        Ok(next)
    }

    pub fn accept(&mut self, index: usize) -> Result<(), EngineError> {
        self.decide(index, ReviewState::Accepted)
    }

    pub fn reject(&mut self, index: usize) -> Result<(), EngineError> {
        self.decide(index, ReviewState::Rejected)
    }

    fn decide(&mut self, index: usize, next: ReviewState) -> Result<(), EngineError> {
        match self.state(index)? {
            from @ ReviewState::FallbackApplied(_) if next != ReviewState::Accepted => {
                Err(EngineError::InvalidTransition {
                    index,
                    from: from.to_string(),
                })
            }
            ReviewState::FallbackApplied(_) => Ok(()),
            _ => {
                self.set(index, next);
                Ok(())
            }
        }
    }

    /// Accepts every item still pending or rejected.
    pub fn accept_all(&mut self) {
        for index in 0..self.items.len() {
            if !matches!(self.items[index].state, ReviewState::FallbackApplied(_)) {
                self.set(index, ReviewState::Accepted);
            }
        }
    }

    pub fn reject_all(&mut self) {
        for index in 0..self.items.len() {
            if !matches!(self.items[index].state, ReviewState::FallbackApplied(_)) {
                self.set(index, ReviewState::Rejected);
            }
        }
    }

    /// Records that an accepted item was written through a fallback.
    pub fn mark_fallback(&mut self, index: usize, method: DiffFallbackMethod) -> Result<(), EngineError> {
        match self.state(index)? {
            ReviewState::Accepted => {
                let item = &mut self.items[index];
                item.state = ReviewState::FallbackApplied(method);
                item.preview.is_fallback = true;
                item.preview.diff_fallback_method = Some(method);
                Ok(())
            }
            from => Err(EngineError::InvalidTransition {
                index,
                from: from.to_string(),
            }),
        }
    }

    /// Previews that take part in apply.
    pub fn checked(&self) -> impl Iterator<Item = (usize, &FileInPreview)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.preview.is_checked)
            .map(|(index, item)| (index, &item.preview))
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.state.is_terminal())
    }

    /// Ends the session, returning the final items.
    pub fn close(self) -> Vec<ReviewItem> {
        log::debug!(
            "Closing review session from {} with {} item(s)",
            self.created_at,
            self.items.len()
        );
        self.items
    }

    fn item(&self, index: usize) -> Result<&ReviewItem, EngineError> {
        self.items.get(index).ok_or(EngineError::ReviewIndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    fn set(&mut self, index: usize, state: ReviewState) {
        let item = &mut self.items[index];
        item.state = state;
        item.preview.is_checked = state != ReviewState::Rejected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditPayload, ParsedEdit};
    use std::path::PathBuf;

    fn preview(path: &str) -> FileInPreview {
        FileInPreview {
            edit: ParsedEdit {
                file_path: path.to_string(),
                workspace_name: None,
                payload: EditPayload::Whole {
                    content: "x".to_string(),
                },
                is_new: false,
                is_deleted: false,
                is_renamed: false,
                old_path: None,
            },
            absolute_path: PathBuf::from("/w").join(path),
            old_absolute_path: None,
            original_content: Some(String::new()),
            proposed_content: "x".to_string(),
            is_checked: false,
            lines_added: 1,
            lines_removed: 0,
            is_fallback: false,
            diff_fallback_method: None,
            is_replaced: false,
        }
    }

    fn session() -> ReviewSession {
        ReviewSession::new(vec![preview("a.rs"), preview("b.rs"), preview("c.rs")])
    }

    #[test]
    fn test_new_session_is_pending_and_checked() {
        let session = session();
        assert_eq!(session.len(), 3);
        assert!(session.items().iter().all(|i| i.state == ReviewState::Pending));
        assert_eq!(session.checked().count(), 3);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_toggle_cycles_between_accepted_and_rejected() {
        let mut session = session();
        assert_eq!(session.toggle(0).unwrap(), ReviewState::Rejected);
        assert!(!session.items()[0].preview.is_checked);
        assert_eq!(session.toggle(0).unwrap(), ReviewState::Accepted);
        assert!(session.items()[0].preview.is_checked);
        assert_eq!(session.toggle(0).unwrap(), ReviewState::Rejected);
    }

    #[test]
    fn test_out_of_range() {
        let mut session = session();
        assert!(matches!(
            session.toggle(7),
            Err(EngineError::ReviewIndexOutOfRange { index: 7, len: 3 })
        ));
    }

    #[test]
    fn test_bulk_operations() {
        let mut session = session();
        session.reject_all();
        assert_eq!(session.checked().count(), 0);
        assert!(session.is_complete());
        session.accept_all();
        assert_eq!(session.checked().count(), 3);
    }

    #[test]
    fn test_fallback_only_from_accepted() {
        let mut session = session();
        assert!(session.mark_fallback(0, DiffFallbackMethod::Recount).is_err());

        session.accept(0).unwrap();
        session.mark_fallback(0, DiffFallbackMethod::Recount).unwrap();
        let item = &session.items()[0];
        assert_eq!(item.state, ReviewState::FallbackApplied(DiffFallbackMethod::Recount));
        assert!(item.preview.is_fallback);
        assert_eq!(item.preview.diff_fallback_method, Some(DiffFallbackMethod::Recount));

        assert!(matches!(session.toggle(0), Err(EngineError::InvalidTransition { index: 0, .. })));
        assert!(session.reject(0).is_err());

        // Bulk operations leave it alone.
        session.reject_all();
        assert!(matches!(session.state(0).unwrap(), ReviewState::FallbackApplied(_)));
        assert_eq!(session.checked().map(|(i, _)| i).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_close_returns_items() {
        let mut session = session();
        session.reject(1).unwrap();
        let items = session.close();
        assert_eq!(items[1].state, ReviewState::Rejected);
        assert_eq!(items[0].state, ReviewState::Pending);
    }
}
