//! Home-directory layout and `~` expansion

use std::path::{Path, PathBuf};

/// Per-user state directory name under `$HOME`
pub const STATE_DIR: &str = ".chartcrypt";

/// Per-repository directory holding the shared key envelope
pub const REPO_DIR: &str = ".chartcrypt-crypt";

pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `~/.chartcrypt`
pub fn state_dir() -> PathBuf {
    home_dir().join(STATE_DIR)
}

pub fn default_key_path() -> PathBuf {
    state_dir().join("key")
}

pub fn default_identity_path() -> PathBuf {
    state_dir().join("identity")
}

pub fn default_config_path() -> PathBuf {
    state_dir().join("config.toml")
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if s == "~" {
            return home_dir();
        }
        if let Some(rest) = s.strip_prefix("~/") {
            return home_dir().join(rest);
        }
    }
    path.to_path_buf()
}
