//! Local-vs-remote diff for a single item.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use dagsync_core::{ItemId, SyncStatus};

/// Everything a client needs to show what publishing (or pulling) an item
/// would change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiff {
    pub item_id: ItemId,
    /// Path of the item inside the repository.
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SyncStatus>,
    /// `None` when the local file is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_content: Option<String>,
    pub remote_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_message: Option<String>,
    /// Remote as `a/`, local as `b/`. Empty when both sides match.
    pub unified_diff: String,
}

/// Unified diff from `remote` to `local` with three lines of context.
pub fn unified(path: &str, remote: &str, local: &str) -> String {
    if remote == local {
        return String::new();
    }
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    TextDiff::from_lines(remote, local)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}
