//! Restore points taken around apply.

pub mod backup;
pub mod git;
pub mod manager;

pub use manager::{CheckpointManager, CheckpointRequest};
