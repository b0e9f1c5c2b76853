// ABOUTME: Well-known filesystem locations for convoy configuration
// ABOUTME: XDG config directory lookup and tilde expansion for configured paths

use std::path::PathBuf;

/// Name of the configuration file, both locally and in the XDG directory
pub const CONFIG_FILE_NAME: &str = "convoy.toml";

/// ~/.config/convoy (or the platform equivalent)
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "convoy").map(|dirs| dirs.config_dir().to_path_buf())
}

/// ~/.config/convoy/convoy.toml
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().join(rest).to_string_lossy().to_string();
        }
        tracing::warn!(path, "Failed to expand tilde: could not determine home directory");
    } else if path == "~" {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        }
        tracing::warn!("Failed to expand tilde: could not determine home directory");
    }
    path.to_string()
}
