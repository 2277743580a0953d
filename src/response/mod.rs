pub mod cleaner;
pub mod fence;
pub mod formats;
pub mod parser;

pub use cleaner::clean;
pub use parser::{parse, parse_with_diagnostics, ParseOutput};

use crate::models::{ParsedEdit, RelevantFilesItem, Segment};

/// A parsed response split into what the host shows and what it applies.
#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub text: Vec<String>,
    pub relevant_files: Option<RelevantFilesItem>,
    pub edits: Vec<ParsedEdit>,
}

/// Cleans and parses raw response text in one step.
pub fn ingest(raw: &str) -> ParsedResponse {
    let cleaned = clean(raw);
    let output = parse_with_diagnostics(&cleaned);
    for diagnostic in &output.diagnostics {
        log::debug!("{}", diagnostic);
    }

    let mut response = ParsedResponse::default();
    for segment in output.segments {
        match segment {
            Segment::Text(text) => response.text.push(text),
            Segment::Relevant(item) => {
                if response.relevant_files.is_none() {
                    response.relevant_files = Some(item);
                }
            }
            Segment::Edit(edit) => response.edits.push(edit),
        }
    }
    response
}
