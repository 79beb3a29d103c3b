// src/brainstorm/mod.rs — Multi-provider brainstorm engine

pub mod group;
pub mod history;
pub mod judge;
pub mod orchestrator;
pub mod preset;
pub mod progress;

pub use group::{RunGroup, RunResult};
pub use judge::{Judge, JudgeSettings};
pub use orchestrator::{BrainstormOutcome, CancelHandle, Orchestrator};
pub use progress::ProgressUpdate;
