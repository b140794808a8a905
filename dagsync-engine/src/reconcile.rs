//! Status derivation.
//!
//! [`reconcile`] is pure: it takes what the ledger remembers, what is on
//! disk and what the remote looks like, and returns the entry the ledger
//! should hold next. It never performs I/O; the coordinator gathers the
//! inputs and decides what to do with the outcome.

use chrono::{DateTime, Utc};

use dagsync_core::{ItemId, SyncItem, SyncStatus};

use crate::transport::CommitInfo;

/// What the remote knows about one item.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteView<'a> {
    /// Remote branch head the view was taken at. `None` for an empty remote.
    pub head: Option<&'a str>,
    /// Hash of the item's content at `head`, `None` if the path is absent.
    pub hash: Option<&'a str>,
    /// Newest commit touching the item's path after the entry's
    /// `base_commit`, if any.
    pub newer: Option<&'a CommitInfo>,
}

/// Outcome of reconciling one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub item: SyncItem,
    /// Local content is unchanged but the remote moved on; a pull takes the
    /// remote side without asking.
    pub remote_ahead: bool,
    /// The remote move was a deletion of the item's path.
    pub remote_deleted: bool,
}

impl Reconciliation {
    fn settled(item: SyncItem) -> Self {
        Self {
            item,
            remote_ahead: false,
            remote_deleted: false,
        }
    }
}

/// Derive the next ledger entry for `id`.
///
/// Returns `None` when there is nothing to track: no entry and no local
/// file. Remote-only items are the caller's business.
pub fn reconcile(
    id: &ItemId,
    entry: Option<&SyncItem>,
    local_hash: Option<&str>,
    remote: &RemoteView<'_>,
    now: DateTime<Utc>,
) -> Option<Reconciliation> {
    let Some(local) = local_hash else {
        return entry.map(|entry| missing(entry, remote, now));
    };
    match entry {
        Some(entry) if entry.has_baseline() => Some(tracked(entry, local, remote, now)),
        entry => Some(untracked(id, entry, local, remote, now)),
    }
}

fn missing(entry: &SyncItem, remote: &RemoteView<'_>, now: DateTime<Utc>) -> Reconciliation {
    let mut item = entry.clone();
    transition(&mut item, SyncStatus::Missing);
    item.local_hash = None;
    item.conflict_detected_at = None;
    item.missing_at.get_or_insert(now);
    set_remote_meta(&mut item, remote.newer);
    Reconciliation::settled(item)
}

fn untracked(
    id: &ItemId,
    entry: Option<&SyncItem>,
    local: &str,
    remote: &RemoteView<'_>,
    now: DateTime<Utc>,
) -> Reconciliation {
    // identical content already on the remote: adopt it as the baseline
    if let (Some(head), Some(remote_hash)) = (remote.head, remote.hash) {
        if remote_hash == local {
            let mut item = SyncItem::synced(id.clone(), local.to_string(), head.to_string(), now);
            item.previous_status = entry
                .map(|entry| entry.status)
                .filter(|status| *status != SyncStatus::Synced);
            return Reconciliation::settled(item);
        }
    }

    let mut item = match entry {
        Some(entry) => entry.clone(),
        None => SyncItem::untracked(id.clone(), local.to_string(), now),
    };
    if item.local_hash.as_deref() != Some(local) {
        item.local_hash = Some(local.to_string());
        item.modified_at = Some(now);
    }
    transition(&mut item, SyncStatus::Untracked);
    item.missing_at = None;
    item.conflict_detected_at = None;
    set_remote_meta(&mut item, None);
    Reconciliation::settled(item)
}

fn tracked(
    entry: &SyncItem,
    local: &str,
    remote: &RemoteView<'_>,
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut item = entry.clone();
    let unchanged = item.last_synced_hash.as_deref() == Some(local);
    if item.local_hash.as_deref() != Some(local) {
        item.local_hash = Some(local.to_string());
        if !unchanged {
            item.modified_at = Some(now);
        }
    }
    item.missing_at = None;

    let (status, remote_ahead, remote_deleted) = match (unchanged, remote.newer) {
        (true, None) => (SyncStatus::Synced, false, false),
        (true, Some(_)) => (SyncStatus::Synced, true, remote.hash.is_none()),
        (false, None) => (SyncStatus::Modified, false, false),
        // both sides made the same edit
        (false, Some(_)) if remote.hash == Some(local) => (SyncStatus::Synced, true, false),
        (false, Some(_)) => (SyncStatus::Conflict, false, false),
    };

    transition(&mut item, status);
    if status == SyncStatus::Conflict {
        item.conflict_detected_at.get_or_insert(now);
    } else {
        item.conflict_detected_at = None;
    }
    set_remote_meta(&mut item, remote.newer);

    Reconciliation {
        item,
        remote_ahead,
        remote_deleted,
    }
}

fn transition(item: &mut SyncItem, status: SyncStatus) {
    if item.status != status {
        item.previous_status = Some(item.status);
        item.status = status;
    }
}

fn set_remote_meta(item: &mut SyncItem, newer: Option<&CommitInfo>) {
    item.remote_commit = newer.map(|c| c.id.clone());
    item.remote_author = newer.map(|c| c.author.clone());
    item.remote_message = newer.map(|c| c.message.clone());
}
