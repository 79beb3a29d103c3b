// src/cli/progress.rs — Terminal renderer for brainstorm progress

use crate::brainstorm::progress::ProgressUpdate;

/// One stderr line per update.
pub fn format_progress(update: &ProgressUpdate) -> String {
    format!("[{:>3}%] {}", update.percent, update.message)
}

pub fn format_error(message: &str) -> String {
    format!("[error] {message}")
}

/// Build a progress callback that writes formatted output to stderr.
///
/// All progress output goes to stderr so stdout remains clean for results.
/// Returns a closure suitable for `Orchestrator::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressUpdate) + Send + Sync + 'static {
    move |update| eprintln!("{}", format_progress(&update))
}

/// Error callback for `Orchestrator::with_errors()`.
pub fn terminal_errors() -> impl Fn(String) + Send + Sync + 'static {
    move |message| eprintln!("{}", format_error(&message))
}
