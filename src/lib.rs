// src/lib.rs — Library root for muse

pub mod brainstorm;
pub mod cli;
pub mod infra;
pub mod provider;
pub mod util;
