// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the MUSE_HOME environment variable for isolation.
// When MUSE_HOME is set, config and data live under that directory.
// When unset, config uses ~/.muse/ and data uses XDG_DATA_HOME/muse.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "muse"))
        .as_ref()
}

fn muse_home() -> Option<PathBuf> {
    std::env::var_os("MUSE_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when no home can be resolved.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $MUSE_HOME/ or ~/.muse/
pub fn config_dir() -> PathBuf {
    if let Some(home) = muse_home() {
        return home;
    }
    dirs_home().join(".muse")
}

/// Data directory: $MUSE_HOME/data/ or ~/.local/share/muse/
pub fn data_dir() -> PathBuf {
    if let Some(home) = muse_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Saved brainstorm presets
pub fn presets_dir() -> PathBuf {
    data_dir().join("brainstorm_presets")
}

/// One JSON file per finished run
pub fn history_dir() -> PathBuf {
    data_dir().join("brainstorm_history")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), presets_dir(), history_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
