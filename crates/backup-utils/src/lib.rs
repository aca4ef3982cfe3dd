use std::path::{Path, PathBuf};

pub struct StatePaths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub marker_path: PathBuf,
    pub last_run_path: PathBuf,
}

/// Namespace used under every base directory.
const APP_ID: &str = "mc-backup";

pub fn state_paths() -> StatePaths {
    // Linux: prefer XDG_STATE_HOME if present.
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME").filter(|value| !value.is_empty()) {
        return state_paths_in(PathBuf::from(xdg).join(APP_ID));
    }

    if let Some(base) = dirs::data_local_dir() {
        return state_paths_in(base.join(APP_ID));
    }

    if let Some(home) = dirs::home_dir() {
        return state_paths_in(home.join(".mc-backup"));
    }

    // Last resort fallback
    state_paths_in(std::env::temp_dir().join(APP_ID))
}

pub fn state_paths_in(state_dir: PathBuf) -> StatePaths {
    StatePaths {
        lock_path: state_dir.join("mc-backup.lock"),
        marker_path: state_dir.join("run-marker.json"),
        last_run_path: state_dir.join("last_backup.txt"),
        state_dir,
    }
}

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_ID).join("config.toml"))
}

pub fn ensure_dir(p: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(p)
}
