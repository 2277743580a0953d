//! Ingests assistant responses and applies the file edits they contain.
//!
//! The pipeline runs leaves first: [`response`] cleans and parses raw text
//! into edits, [`workspace`] binds their paths to workspace roots,
//! [`file_processing`] computes proposed content (using [`diff`]) and writes
//! it, [`review`] tracks what the user accepted and [`checkpoint`] takes the
//! restore point around a write.

pub mod checkpoint;
pub mod diff;
pub mod errors;
pub mod file_processing;
pub mod models;
pub mod response;
pub mod review;
pub mod utils;
pub mod workspace;
