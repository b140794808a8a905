//! On-disk layout.
//!
//! ```text
//! ~/.dagsync/
//!   config.yaml    (SyncConfig, mode 0600)
//!   ledger.json    (status ledger)
//!   mirror.git/    (bare mirror used by the git transport)
//!   items/         (default content root)
//!   daemon.sock    (auto-sync daemon control socket)
//! ```
//!
//! Every helper takes `home` explicitly; [`home`] resolves the real one.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const ROOT_DIR: &str = ".dagsync";

pub fn root_at(home: &Path) -> PathBuf {
    home.join(ROOT_DIR)
}

pub fn config_path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

pub fn ledger_path_at(home: &Path) -> PathBuf {
    root_at(home).join("ledger.json")
}

pub fn mirror_path_at(home: &Path) -> PathBuf {
    root_at(home).join("mirror.git")
}

pub fn items_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("items")
}

pub fn socket_path_at(home: &Path) -> PathBuf {
    root_at(home).join("daemon.sock")
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
