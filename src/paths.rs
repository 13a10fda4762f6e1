// ABOUTME: Standardized paths for switchyard config, data, and logs
// ABOUTME: Uses ~/.config/switchyard for config and ~/.local/share/switchyard for data

use directories::BaseDirs;
use std::path::PathBuf;

fn home_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// ~/.config/switchyard/
pub fn config_dir() -> PathBuf {
    home_dir().join(".config").join("switchyard")
}

/// ~/.config/switchyard/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// ~/.local/share/switchyard/, or ./data when no home directory is known
pub fn data_dir() -> PathBuf {
    let home = home_dir();
    if home == PathBuf::from(".") {
        PathBuf::from("./data")
    } else {
        home.join(".local").join("share").join("switchyard")
    }
}

/// Default conversation database location
pub fn database_file() -> PathBuf {
    data_dir().join("switchyard.db")
}

/// Expand a leading `~` to the home directory.
/// Logs a warning and returns the path unchanged when the home directory is unknown.
pub fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(path = %path, "Failed to expand tilde: could not determine home directory");
    } else if path == "~" {
        if let Some(base_dirs) = BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        }
        tracing::warn!("Failed to expand tilde: could not determine home directory");
    }
    path.to_string()
}
