// src/brainstorm/progress.rs — Progress and error notification plumbing

use std::sync::{Arc, Mutex};

/// One progress notification: overall completion plus a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// 0–100, never decreasing within a run.
    pub percent: u8,
    pub message: String,
}

/// Observer for progress updates. Called synchronously; keep it cheap.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Observer for abandoned runs, one human-readable line per failure.
pub type ErrorFn = Arc<dyn Fn(String) + Send + Sync>;

/// Tracks completed runs out of a fixed total and forwards updates to the
/// observer in the order they were computed.
pub struct ProgressReporter {
    total: usize,
    completed: Mutex<usize>,
    sink: Option<ProgressFn>,
}

impl ProgressReporter {
    pub fn new(total: usize, sink: Option<ProgressFn>) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            sink,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.lock().map(|c| *c).unwrap_or(self.total)
    }

    /// Status change without a completion (run started, retry scheduled).
    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        let Ok(done) = self.completed.lock() else {
            return;
        };
        self.emit(percent(*done, self.total), message);
    }

    /// Mark one run as resolved, whatever its outcome.
    pub fn complete_one(&self, message: impl Into<String>) {
        let message = message.into();
        let Ok(mut done) = self.completed.lock() else {
            return;
        };
        *done = (*done + 1).min(self.total);
        self.emit(percent(*done, self.total), message);
    }

    /// Terminal update; always reports 100 %.
    pub fn finish(&self, message: impl Into<String>) {
        let message = message.into();
        let Ok(mut done) = self.completed.lock() else {
            return;
        };
        *done = self.total;
        self.emit(100, message);
    }

    // Called with the counter lock held so observers see updates in order.
    fn emit(&self, percent: u8, message: String) {
        if let Some(ref sink) = self.sink {
            sink(ProgressUpdate { percent, message });
        }
    }
}

/// Integer percentage of `done` out of `total`; an empty run is complete.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
