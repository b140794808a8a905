use chrono::Utc;
use tokio_util::sync::CancellationToken;

use dagsync_core::{ItemError, ItemId, SyncItem, SyncResult, SyncStatus};

use crate::conflict::mark_published;
use crate::error::SyncError;
use crate::hash::content_hash;

use super::{checkpoint, SyncCoordinator};

/// What a pull does with one item once the remote has been read.
#[derive(Debug)]
enum Step {
    /// Take the remote content and record it as the baseline.
    Write { item: SyncItem, content: Vec<u8> },
    /// The remote deleted an item that has no local edits.
    Remove { id: ItemId },
    /// Ledger refresh only; local content stays as it is.
    Keep { item: SyncItem },
}

impl SyncCoordinator {
    /// Bring local content up to the remote branch.
    ///
    /// Remote-only changes land in the content store; local edits are never
    /// overwritten. Never writes to the remote.
    pub fn pull(&self, cancel: &CancellationToken) -> Result<SyncResult, SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_enabled()?;
        checkpoint(cancel)?;

        let head = match session.fetch() {
            Ok(head) => head,
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(error = %message, "pull: fetch failed");
                self.ledger
                    .update(|state| state.record_failure(&message, Utc::now()))?;
                return Err(err);
            }
        };

        let now = Utc::now();
        let snapshot = self.ledger.snapshot();
        let mut ids = self.known_ids()?;
        if let Some(head) = head.as_deref() {
            let files = session
                .transport
                .list_files(head, session.config.remote_root())?;
            ids.extend(
                files
                    .iter()
                    .filter_map(|path| session.config.item_for_remote_path(path)),
            );
        }

        let mut steps = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = snapshot.items.get(&id);
            let observed = self.observe(&session, &id, entry, head.as_deref(), now)?;
            let remote_content = observed.remote.content;
            let remote_hash = observed.remote.hash;

            let Some(outcome) = observed.outcome else {
                // only the remote has it
                if let (Some(head), Some(content), Some(hash)) =
                    (head.as_deref(), remote_content, remote_hash)
                {
                    let item = SyncItem::synced(id, hash, head.to_string(), now);
                    steps.push(Step::Write { item, content });
                }
                continue;
            };

            let mut item = outcome.item;
            match (outcome.remote_ahead, head.as_deref()) {
                (true, Some(_)) if outcome.remote_deleted => {
                    steps.push(Step::Remove { id });
                }
                (true, Some(head)) => {
                    let content = remote_content.unwrap_or_default();
                    let hash = remote_hash.unwrap_or_else(|| content_hash(&content));
                    let converged = observed.local_hash.as_deref() == Some(hash.as_str());
                    mark_published(&mut item, &hash, head, now);
                    if converged {
                        steps.push(Step::Keep { item });
                    } else {
                        steps.push(Step::Write { item, content });
                    }
                }
                (_, head) => {
                    // nothing touched the path since the base: move the base up
                    if let Some(head) = head {
                        if item.has_baseline()
                            && matches!(item.status, SyncStatus::Synced | SyncStatus::Modified)
                        {
                            item.base_commit = Some(head.to_string());
                        }
                    }
                    if item.status == SyncStatus::Untracked && remote_hash.is_some() {
                        tracing::warn!(
                            item_id = %item.item_id,
                            "local item differs from an unrelated remote copy; leaving it untracked"
                        );
                    }
                    steps.push(Step::Keep { item });
                }
            }
        }

        checkpoint(cancel)?;

        let mut result = SyncResult::new(String::new());
        let mut upserts = Vec::new();
        let mut removals = Vec::new();
        for step in steps {
            match step {
                Step::Write { item, content } => match self.store.put(&item.item_id, &content) {
                    Ok(()) => {
                        tracing::debug!(item_id = %item.item_id, "pull: wrote remote content");
                        result.synced.push(item.item_id.clone());
                        upserts.push(item);
                    }
                    Err(err) => {
                        tracing::warn!(item_id = %item.item_id, error = %err, "pull: write failed");
                        result.errors.push(ItemError {
                            item_id: item.item_id.to_string(),
                            message: err.to_string(),
                        });
                    }
                },
                Step::Remove { id } => match self.store.delete(&id) {
                    Ok(_) => {
                        tracing::debug!(item_id = %id, "pull: removed remotely deleted item");
                        result.synced.push(id.clone());
                        removals.push(id);
                    }
                    Err(err) => {
                        tracing::warn!(item_id = %id, error = %err, "pull: delete failed");
                        result.errors.push(ItemError {
                            item_id: id.to_string(),
                            message: err.to_string(),
                        });
                    }
                },
                Step::Keep { item } => {
                    // only report what this pull newly detected
                    let before = snapshot.items.get(&item.item_id).map(|e| e.status);
                    match item.status {
                        status if before == Some(status) => {}
                        SyncStatus::Modified => result.modified.push(item.item_id.clone()),
                        SyncStatus::Conflict => result.conflicts.push(item.item_id.clone()),
                        _ => {}
                    }
                    upserts.push(item);
                }
            }
        }

        let failed = result.errors.len();
        self.ledger.update(|state| {
            for item in upserts {
                state.items.insert(item.item_id.clone(), item);
            }
            for id in &removals {
                state.items.remove(id);
            }
            state.record_success(head.clone(), now);
            if failed > 0 {
                state.record_failure(&format!("failed to sync {failed} item(s)"), now);
            }
        })?;

        result.success = failed == 0;
        result.message = if failed > 0 {
            format!("Failed to sync {failed} item(s)")
        } else if !result.conflicts.is_empty() {
            format!("Pulled with {} conflict(s)", result.conflicts.len())
        } else if result.synced.is_empty() {
            "Already up to date".to_string()
        } else {
            format!("Synced {} DAG(s)", result.synced.len())
        };
        tracing::info!(
            head = head.as_deref().unwrap_or("-"),
            synced = result.synced.len(),
            conflicts = result.conflicts.len(),
            "pull complete"
        );
        Ok(result)
    }
}
