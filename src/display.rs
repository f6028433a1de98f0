//! Colored terminal rendering of supervisor events.
//!
//! The CLI stands in for the original output pane: child output lines are
//! printed verbatim, supervisor messages and status changes get a
//! timestamped, colored prefix.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::supervisor::Status;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Print a child output line verbatim (it carries its own newline).
pub fn print_output_line(line: &str) {
    print!("{line}");
    let _ = io::stdout().flush();
}

/// Print a status bar change.
pub fn print_status(status: Status) {
    let label = match status {
        Status::Ready => "Ready".green().to_string(),
        Status::Running => "Running...".yellow().to_string(),
    };
    println!("{} {} {label}", timestamp().dimmed(), "[STATUS]".blue().bold());
    let _ = io::stdout().flush();
}

/// Print an informational note.
pub fn print_note(note: &str) {
    println!("{} {} {note}", timestamp().dimmed(), "[NOTE]".cyan().bold());
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {} {message}",
        timestamp().dimmed(),
        "[ERROR]".red().bold()
    );
    let _ = io::stderr().flush();
}
