use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use patchwork::file_processing::PreviewFailure;
use patchwork::models::{Checkpoint, FileInPreview, RelevantFilesItem};
use patchwork::review::{ReviewItem, ReviewState};
use std::time::Duration;

/// Manages CLI display and output formatting.
pub struct CliDisplayManager {
    spinner: Option<ProgressBar>,
}

impl CliDisplayManager {
    pub fn new() -> Self {
        CliDisplayManager { spinner: None }
    }

    /// Prints the application header.
    pub fn print_header(&self) {
        let title = format!("│  🧵 patchwork v{:<6} │", env!("CARGO_PKG_VERSION"));
        println!("\n{}", "╭───────────────────────╮".bright_magenta());
        println!("{}", title.bright_magenta().bold());
        println!("{}\n", "╰───────────────────────╯".bright_magenta());
    }

    /// Prints the free text of a response, dimmed.
    pub fn print_response_text(&self, text: &[String]) {
        let text = text.join("\n");
        if text.trim().is_empty() {
            return;
        }
        self.print_section("💬", "Response", "");
        for line in text.lines() {
            println!("   {}", line.dimmed());
        }
        println!();
    }

    pub fn print_relevant_files(&self, item: &RelevantFilesItem) {
        self.print_section("📎", "Relevant files", "");
        for path in &item.file_paths {
            self.print_info(path);
        }
        println!();
    }

    /// Prints one numbered line per preview.
    pub fn print_previews(&self, previews: &[FileInPreview]) {
        self.print_section(
            "📁",
            "Proposed changes",
            &format!("{} file(s)", previews.len()),
        );
        for (index, preview) in previews.iter().enumerate() {
            println!(
                "   {} {}",
                format!("{:>2}.", index + 1).bright_white(),
                self.describe_preview(preview)
            );
        }
        println!();
    }

    pub fn print_failures(&self, failures: &[PreviewFailure]) {
        if failures.is_empty() {
            return;
        }
        self.print_section("⚠️", "Skipped", &format!("{} edit(s) could not be prepared", failures.len()));
        for failure in failures {
            println!("   {} {}", "✗".bright_red(), failure.error.to_string().red());
        }
        println!();
    }

    /// Prints the final state of each reviewed file.
    pub fn print_review(&self, items: &[ReviewItem]) {
        self.print_section("💾", "Applied", "");
        for item in items {
            let marker = match item.state {
                ReviewState::Accepted => "✓".bright_green(),
                ReviewState::FallbackApplied(_) => "✓".bright_yellow(),
                ReviewState::Rejected => "–".dimmed(),
                ReviewState::Pending => "?".bright_white(),
            };
            println!(
                "   {} {} {}",
                marker,
                item.preview.edit.file_path,
                format!("({})", item.state).dimmed()
            );
        }
        println!();
    }

    pub fn print_checkpoints(&self, checkpoints: &[Checkpoint]) {
        if checkpoints.is_empty() {
            self.print_info("No checkpoints yet");
            return;
        }
        for checkpoint in checkpoints {
            let when = chrono::DateTime::from_timestamp_millis(checkpoint.timestamp)
                .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let star = if checkpoint.is_starred { "★" } else { " " };
            let description = checkpoint.description.as_deref().unwrap_or("");
            let storage = if checkpoint.uses_git { "git" } else { "backup" };
            println!(
                "{} {} {} {} {} {}",
                star.bright_yellow(),
                checkpoint.timestamp.to_string().bright_white(),
                when.dimmed(),
                checkpoint.title.bright_cyan().bold(),
                description.italic(),
                format!("[{}]", storage).dimmed()
            );
        }
    }

    pub fn print_context_files(&self, files: &[std::path::PathBuf]) {
        for file in files {
            println!("{}", file.display());
        }
        self.print_info(&format!("{} file(s) selected", files.len()));
    }

    /// Prints the application footer.
    pub fn print_footer(&self, written: usize, failed: usize, duration: Duration) {
        println!();
        println!(
            "{}",
            format!("⚡ Wrote {} file(s)", written).bright_white().dimmed(),
        );
        if failed > 0 {
            println!("{}", format!("⚡ {} file(s) failed", failed).bright_red());
        }
        println!(
            "{}",
            format!("⚡ Completed in {:.2?}", duration)
                .bright_white()
                .dimmed(),
        );
        println!();
    }

    /// Starts a spinner for ongoing operations.
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template(&format!(
            "   {} {{spinner}} {}",
            "→".bright_white(),
            message.italic().bright_white()
        )) {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    /// Stops the spinner.
    pub fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    pub fn print_error(&self, message: &str) {
        println!("   {} {}", "✗".bright_red(), message.red());
    }

    /// Helper function to print a section header.
    pub fn print_section(&self, icon: &str, title: &str, description: &str) {
        println!("{} {}", icon.bright_yellow(), title.bright_cyan().bold());
        if !description.is_empty() {
            println!(
                "   {} {}",
                "→".bright_white(),
                description.italic().bright_white()
            );
        }
    }

    /// Helper function to print an informational message.
    pub fn print_info(&self, message: &str) {
        println!(
            "   {} {}",
            "→".bright_white(),
            message.italic().bright_white()
        );
    }

    fn describe_preview(&self, preview: &FileInPreview) -> String {
        let edit = &preview.edit;
        let label = if edit.is_deleted {
            "deleted".bright_red()
        } else if edit.is_renamed {
            "renamed".bright_blue()
        } else if preview.original_content.is_none() {
            "new".bright_green()
        } else if preview.is_replaced {
            "replaced".bright_yellow()
        } else {
            "updated".bright_white()
        };
        let mut line = format!(
            "{} {} {} {}",
            edit.file_path.bold(),
            label,
            format!("+{}", preview.lines_added).green(),
            format!("-{}", preview.lines_removed).red()
        );
        if let Some(old_path) = &edit.old_path {
            line.push_str(&format!(" {}", format!("(from {})", old_path).dimmed()));
        }
        if let Some(workspace) = &edit.workspace_name {
            line.push_str(&format!(" {}", format!("[{}]", workspace).dimmed()));
        }
        if let Some(method) = preview.diff_fallback_method {
            line.push_str(&format!(" {}", format!("(fallback: {})", method.as_str()).yellow()));
        }
        line.push_str(&format!(" {}", format!("<{}>", edit.edit_format().as_str()).dimmed()));
        line
    }
}
