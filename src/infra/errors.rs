// src/infra/errors.rs — Error types for muse

use thiserror::Error;

/// Status markers that classify a provider failure as transient.
pub const TRANSIENT_MARKERS: [&str; 5] = ["429", "500", "502", "503", "504"];

#[derive(Error, Debug)]
pub enum BrainstormError {
    // Provider errors (retriable when transient)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Request to '{provider}' timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    // Setup errors (reported before any task starts)
    #[error("Run group #{index} is invalid: {reason}")]
    InvalidRunGroup { index: usize, reason: String },

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Unknown provider '{provider}' and no rate-limit override given")]
    UnknownProvider { provider: String },

    #[error("Run was cancelled")]
    Cancelled,

    // User errors
    #[error("Preset '{name}' not found{}", did_you_mean(.suggestion))]
    PresetNotFound {
        name: String,
        suggestion: Option<String>,
    },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrainstormError {
    /// Whether a retry with backoff might succeed.
    ///
    /// Explicit flags win; otherwise the error text is scanned for
    /// rate-limit / server-unavailable status codes.
    pub fn is_transient(&self) -> bool {
        match self {
            BrainstormError::Provider {
                retriable: true, ..
            }
            | BrainstormError::Timeout { .. } => true,
            BrainstormError::Provider { message, .. } => message_is_transient(message),
            _ => false,
        }
    }

    /// Setup errors are raised before execution and never retried.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            BrainstormError::InvalidRunGroup { .. }
                | BrainstormError::EmptyPrompt
                | BrainstormError::UnknownProvider { .. }
        )
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

/// True when `text` carries one of the [`TRANSIENT_MARKERS`].
pub fn message_is_transient(text: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|code| text.contains(code))
}
