// src/infra/logger.rs — Structured logging with tracing

use tracing_subscriber::{fmt, EnvFilter};

/// Env var consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "MUSE_LOG";

/// Install the global subscriber. Logs go to stderr so stdout stays
/// reserved for brainstorm results.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, embedding callers) is harmless.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// Pick the default filter from CLI flags.
pub fn level_for(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "warn",
    }
}
