pub mod preview;
pub mod reader;
pub mod reconciler;
pub mod writer;

pub use preview::{build_preview, build_previews, PreviewFailure, PreviewSet};
pub use reconciler::{CommandReconciler, ConfiguredReconciler, NoReconciler, Reconciler};
pub use writer::{ApplyCoordinator, PendingWrite};
