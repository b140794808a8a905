//! dagsync core library: domain types, configuration persistence, errors.
//!
//! - [`types`]: item IDs and kinds, statuses, ledger entries, results
//! - [`config`]: [`SyncConfig`] with validation and YAML load / save
//! - [`paths`]: on-disk layout under `~/.dagsync/`
//! - [`error`]: [`ConfigError`], [`ValidationError`], [`InvalidItemId`]

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{AuthConfig, AuthType, AutoSyncConfig, CommitConfig, SyncConfig, SyncConfigView};
pub use error::{ConfigError, InvalidItemId, ValidationError};
pub use types::{
    ConnectionResult, ItemError, ItemId, ItemKind, LastSyncStatus, OverallStatus, StatusCounts,
    SummaryStatus, SyncItem, SyncResult, SyncStatus,
};
