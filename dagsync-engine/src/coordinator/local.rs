//! Operations that only touch the content store and the ledger.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use dagsync_core::{ItemId, SyncItem, SyncStatus};

use crate::error::SyncError;
use crate::hash::content_hash;

use super::{checkpoint, parse_id, SyncCoordinator};

impl SyncCoordinator {
    /// Throw away local edits.
    ///
    /// Published items get their content back from `base_commit`; items
    /// that were never published are deleted locally and forgotten.
    pub fn discard(&self, cancel: &CancellationToken, id: &str) -> Result<(), SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_enabled()?;
        let id = parse_id(id)?;

        let entry = self.ledger.get(&id);
        let local_exists = self.store.get(&id)?.is_some();
        let baseline = entry.as_ref().filter(|entry| entry.has_baseline());

        let Some(entry) = baseline else {
            if entry.is_none() && !local_exists {
                return Err(SyncError::DagNotFound { item_id: id });
            }
            checkpoint(cancel)?;
            self.store.delete(&id)?;
            if entry.is_some() {
                self.ledger.delete(&id)?;
            }
            tracing::info!(item_id = %id, "discarded unpublished item");
            return Ok(());
        };

        let base = entry.base_commit.as_deref().unwrap_or_default();
        let content = session
            .transport
            .read_at(base, &session.config.remote_path(&id))?
            .ok_or_else(|| SyncError::DagNotFound {
                item_id: id.clone(),
            })?;

        checkpoint(cancel)?;
        self.store.put(&id, &content)?;
        let restored = restore(entry.clone(), content_hash(&content));
        self.ledger.put(restored)?;
        tracing::info!(item_id = %id, base = %base, "discarded local changes");
        Ok(())
    }

    /// Drop ledger entries without touching local or remote content.
    ///
    /// All IDs are checked before anything is removed; one ineligible ID
    /// fails the whole call.
    pub fn forget(&self, cancel: &CancellationToken, ids: &[String]) -> Result<Vec<ItemId>, SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_enabled()?;
        let ids = ids
            .iter()
            .map(|raw| parse_id(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let snapshot = self.ledger.snapshot();
        let head = snapshot.remote_head.as_deref();
        let now = Utc::now();
        for id in &ids {
            let Some(entry) = snapshot.items.get(id) else {
                return Err(SyncError::DagNotFound {
                    item_id: id.clone(),
                });
            };
            let status = self
                .observe(&session, id, Some(entry), head, now)?
                .outcome
                .map_or(entry.status, |outcome| outcome.item.status);
            if matches!(status, SyncStatus::Modified | SyncStatus::Conflict) {
                return Err(SyncError::CannotForget {
                    item_id: id.clone(),
                    status,
                });
            }
        }

        checkpoint(cancel)?;
        let forgotten = self.ledger.update(|state| {
            let mut removed: Vec<ItemId> = ids
                .into_iter()
                .filter(|id| state.items.remove(id).is_some())
                .collect();
            removed.sort();
            removed.dedup();
            removed
        })?;
        tracing::info!(count = forgotten.len(), "forgot items");
        Ok(forgotten)
    }

    /// Forget every item whose local file is gone.
    pub fn cleanup(&self, cancel: &CancellationToken) -> Result<Vec<ItemId>, SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_enabled()?;

        let mut missing = Vec::new();
        for id in self.ledger.snapshot().items.keys() {
            if self.store.get(id)?.is_none() {
                missing.push(id.clone());
            }
        }
        if missing.is_empty() {
            return Ok(missing);
        }

        checkpoint(cancel)?;
        self.ledger.update(|state| {
            for id in &missing {
                state.items.remove(id);
            }
        })?;
        tracing::info!(count = missing.len(), "cleaned up missing items");
        Ok(missing)
    }
}

/// Entry after its local content was put back to the baseline.
fn restore(mut item: SyncItem, hash: String) -> SyncItem {
    if item.status != SyncStatus::Synced {
        item.previous_status = Some(item.status);
        item.status = SyncStatus::Synced;
    }
    item.local_hash = Some(hash);
    item.remote_commit = None;
    item.remote_author = None;
    item.remote_message = None;
    item.conflict_detected_at = None;
    item.missing_at = None;
    item
}
