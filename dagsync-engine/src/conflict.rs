//! Conflict detection output and the force-override rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dagsync_core::{ItemId, SyncItem, SyncStatus};

/// Local edits and a newer remote commit both touched the same item.
///
/// Not a failure of the engine: callers are expected to render it and let
/// the user pull, discard or force-publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error(
    "'{item_id}' was changed remotely{} while it has local edits; pull, discard or publish with force",
    describe_remote(.remote_commit.as_deref(), .remote_author.as_deref())
)]
pub struct ConflictError {
    pub item_id: ItemId,
    pub remote_commit: Option<String>,
    pub remote_author: Option<String>,
    pub remote_message: Option<String>,
}

fn describe_remote(commit: Option<&str>, author: Option<&str>) -> String {
    match (commit, author) {
        (Some(commit), Some(author)) => format!(" in {} by {author}", short(commit)),
        (Some(commit), None) => format!(" in {}", short(commit)),
        _ => String::new(),
    }
}

fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}

impl ConflictError {
    pub fn from_item(item: &SyncItem) -> Self {
        Self {
            item_id: item.item_id.clone(),
            remote_commit: item.remote_commit.clone(),
            remote_author: item.remote_author.clone(),
            remote_message: item.remote_message.clone(),
        }
    }
}

/// Gate a remote write on `item`. With `force` local content wins.
pub fn check(item: &SyncItem, force: bool) -> Result<(), ConflictError> {
    if item.status == SyncStatus::Conflict && !force {
        return Err(ConflictError::from_item(item));
    }
    Ok(())
}

/// Record that `hash` is now the content of `item` at remote `commit`.
pub fn mark_published(item: &mut SyncItem, hash: &str, commit: &str, now: DateTime<Utc>) {
    if item.status != SyncStatus::Synced {
        item.previous_status = Some(item.status);
        item.status = SyncStatus::Synced;
    }
    item.base_commit = Some(commit.to_string());
    item.last_synced_hash = Some(hash.to_string());
    item.last_synced_at = Some(now);
    item.local_hash = Some(hash.to_string());
    item.remote_commit = None;
    item.remote_author = None;
    item.remote_message = None;
    item.conflict_detected_at = None;
    item.missing_at = None;
}
