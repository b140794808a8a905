//! Error types for dagsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use dagsync_core::{ConfigError, InvalidItemId, ItemId, SyncStatus, ValidationError};

use crate::conflict::ConflictError;
use crate::transport::TransportError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Sync is switched off in the configuration.
    #[error("git sync is not enabled")]
    NotEnabled,

    /// The operation writes to the remote but pushing is disabled.
    #[error("push is disabled in the sync configuration")]
    PushDisabled,

    #[error("cannot forget '{item_id}': it has unpublished local changes ({status})")]
    CannotForget { item_id: ItemId, status: SyncStatus },

    #[error("cannot delete '{item_id}': it was never published; use forget instead")]
    CannotDeleteUntracked { item_id: ItemId },

    #[error("item not found: {item_id}")]
    DagNotFound { item_id: ItemId },

    #[error(transparent)]
    InvalidDagId(#[from] InvalidItemId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Expected outcome: the remote moved underneath a local edit.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("no local changes to publish{}", .item_id.as_ref().map(|id| format!(" for '{id}'")).unwrap_or_default())]
    NoChanges { item_id: Option<ItemId> },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (ledger).
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn is_dag_not_found(&self) -> bool {
        matches!(self, SyncError::DagNotFound { .. })
    }

    pub fn is_invalid_dag_id(&self) -> bool {
        matches!(self, SyncError::InvalidDagId(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict(_))
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
