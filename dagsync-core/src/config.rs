//! `SyncConfig`: what to sync with and how.
//!
//! Persisted as YAML at `<home>/.dagsync/config.yaml` with the same write
//! flow everywhere: validate, serialize, write `.yaml.tmp`, `chmod 0600`,
//! rename. A missing file loads as the (disabled) default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};
use crate::paths::{config_path_at, home, root_at};
use crate::types::ItemId;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_AUTHOR_NAME: &str = "dagsync";
pub const DEFAULT_AUTHOR_EMAIL: &str = "dagsync@localhost";
pub const DEFAULT_INTERVAL_SECONDS: u64 = 300;

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub repository: String,
    pub branch: String,
    /// Subdirectory inside the repository that holds the items.
    pub path: String,
    pub push_enabled: bool,
    pub auth: AuthConfig,
    pub auto_sync: AutoSyncConfig,
    pub commit: CommitConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repository: String::new(),
            branch: DEFAULT_BRANCH.to_string(),
            path: String::new(),
            push_enabled: true,
            auth: AuthConfig::default(),
            auto_sync: AutoSyncConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Token,
    Ssh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: AuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_passphrase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSyncConfig {
    pub enabled: bool,
    pub on_startup: bool,
    pub interval_seconds: u64,
}

impl Default for AutoSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_startup: true,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub author_name: String,
    pub author_email: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Read-side view of [`SyncConfig`] with secrets reduced to flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfigView {
    pub enabled: bool,
    pub repository: String,
    pub branch: String,
    pub path: String,
    pub push_enabled: bool,
    pub auth: AuthView,
    pub auto_sync: AutoSyncConfig,
    pub commit: CommitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthView {
    #[serde(rename = "type")]
    pub kind: AuthType,
    pub token_configured: bool,
    pub ssh_key_configured: bool,
}

// ---------------------------------------------------------------------------
// 2. Behaviour
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Check the invariants that must hold before the config is persisted
    /// or used for remote I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled {
            if self.repository.trim().is_empty() {
                return Err(ValidationError::new(
                    "repository",
                    "is required when sync is enabled",
                ));
            }
            if self.branch.trim().is_empty() {
                return Err(ValidationError::new(
                    "branch",
                    "is required when sync is enabled",
                ));
            }
        }
        if self.branch.contains(char::is_whitespace) || self.branch.contains("..") {
            return Err(ValidationError::new("branch", "is not a valid branch name"));
        }
        if self.path.contains('\\')
            || self
                .path
                .split('/')
                .any(|segment| segment == ".." || segment == ".")
        {
            return Err(ValidationError::new(
                "path",
                "must be a plain relative directory inside the repository",
            ));
        }
        match self.auth.kind {
            AuthType::None => {}
            AuthType::Token => {
                if self.auth.token.as_deref().map_or(true, str::is_empty) {
                    return Err(ValidationError::new(
                        "auth.token",
                        "is required for token authentication",
                    ));
                }
            }
            AuthType::Ssh => {
                if self.auth.ssh_key_path.is_none() {
                    return Err(ValidationError::new(
                        "auth.ssh_key_path",
                        "is required for ssh authentication",
                    ));
                }
            }
        }
        if self.auto_sync.enabled && self.auto_sync.interval_seconds == 0 {
            return Err(ValidationError::new(
                "auto_sync.interval_seconds",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Repository URL as handed to the transport.
    ///
    /// Shorthand such as `github.com/acme/dags` becomes
    /// `https://github.com/acme/dags.git`; full URLs and local paths pass
    /// through untouched.
    pub fn repository_url(&self) -> String {
        let repo = self.repository.trim();
        let is_full = ["https://", "http://", "ssh://", "git@", "file://", "/"]
            .iter()
            .any(|prefix| repo.starts_with(prefix));
        if is_full {
            repo.to_string()
        } else {
            format!("https://{repo}.git")
        }
    }

    fn path_prefix(&self) -> &str {
        self.path.trim_matches('/')
    }

    /// Path of `id` inside the repository tree.
    pub fn remote_path(&self, id: &ItemId) -> String {
        match self.path_prefix() {
            "" => id.file_name(),
            prefix => format!("{prefix}/{}", id.file_name()),
        }
    }

    /// Inverse of [`SyncConfig::remote_path`]; `None` for files that are not
    /// items.
    pub fn item_for_remote_path(&self, path: &str) -> Option<ItemId> {
        let relative = match self.path_prefix() {
            "" => path,
            prefix => path.strip_prefix(prefix)?.strip_prefix('/')?,
        };
        ItemId::from_file_name(relative)
    }

    /// Directory (inside the repository) that holds every item.
    pub fn remote_root(&self) -> &str {
        self.path_prefix()
    }

    /// Copy secrets from `current` when this config leaves them out and
    /// keeps the same auth type. Lets clients round-trip a redacted view.
    pub fn inherit_secrets(&mut self, current: &SyncConfig) {
        if self.auth.kind != current.auth.kind {
            return;
        }
        if self.auth.token.is_none() {
            self.auth.token = current.auth.token.clone();
        }
        if self.auth.ssh_key_path.is_none() {
            self.auth.ssh_key_path = current.auth.ssh_key_path.clone();
        }
        if self.auth.ssh_passphrase.is_none() {
            self.auth.ssh_passphrase = current.auth.ssh_passphrase.clone();
        }
    }

    pub fn redacted(&self) -> SyncConfigView {
        SyncConfigView {
            enabled: self.enabled,
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            path: self.path.clone(),
            push_enabled: self.push_enabled,
            auth: AuthView {
                kind: self.auth.kind,
                token_configured: self.auth.token.as_deref().is_some_and(|t| !t.is_empty()),
                ssh_key_configured: self.auth.ssh_key_path.is_some(),
            },
            auto_sync: self.auto_sync.clone(),
            commit: self.commit.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.dagsync/config.yaml`, or the default when absent.
pub fn load_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&home()?)
}

/// Validate and atomically save the config.
pub fn save_at(home: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    config.validate()?;

    let dir = root_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &SyncConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
