use std::collections::BTreeSet;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use dagsync_core::{ItemError, ItemId, SyncItem, SyncResult, SyncStatus};

use crate::conflict::{self, mark_published, ConflictError};
use crate::error::SyncError;
use crate::transport::FileChange;

use super::{checkpoint, parse_id, SyncCoordinator};

/// One item queued for a batch commit.
struct Staged {
    item: SyncItem,
    hash: String,
    content: Vec<u8>,
}

impl SyncCoordinator {
    /// Commit and push one item. Local content wins over the remote only
    /// with `force`.
    pub fn publish(
        &self,
        cancel: &CancellationToken,
        id: &str,
        message: Option<&str>,
        force: bool,
    ) -> Result<SyncResult, SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_push()?;
        let id = parse_id(id)?;
        if self.store.get(&id)?.is_none() {
            return Err(SyncError::DagNotFound { item_id: id });
        }

        let head = session.fetch()?;
        let now = Utc::now();
        let entry = self.ledger.get(&id);
        let observed = self.observe(&session, &id, entry.as_ref(), head.as_deref(), now)?;
        let (Some(content), Some(hash), Some(outcome)) =
            (observed.local, observed.local_hash, observed.outcome)
        else {
            return Err(SyncError::DagNotFound { item_id: id });
        };

        let mut item = outcome.item;
        conflict::check(&item, force)?;
        if item.status == SyncStatus::Synced {
            return Err(SyncError::NoChanges { item_id: Some(id) });
        }

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Update {id}"));
        let changes = [FileChange::Upsert {
            path: session.config.remote_path(&id),
            content,
        }];

        checkpoint(cancel)?;
        let commit = session
            .transport
            .commit(head.as_deref(), &changes, &message, &session.author())?;
        session.transport.push(session.branch(), &commit)?;

        mark_published(&mut item, &hash, &commit, now);
        self.ledger.update(|state| {
            state.items.insert(id.clone(), item);
            state.record_success(Some(commit.clone()), now);
        })?;
        tracing::info!(item_id = %id, commit = %commit, forced = force, "published");

        let mut result = SyncResult::new(format!("Published {id}"));
        result.synced.push(id);
        Ok(result)
    }

    /// Publish several items in one commit.
    ///
    /// Without `ids` every `Modified` or `Untracked` item is included.
    /// Items that cannot be published are reported in `errors`; the rest
    /// still go out.
    pub fn publish_all(
        &self,
        cancel: &CancellationToken,
        message: Option<&str>,
        ids: Option<&[String]>,
    ) -> Result<SyncResult, SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_push()?;
        let requested = ids
            .map(|ids| {
                ids.iter()
                    .map(|raw| parse_id(raw))
                    .collect::<Result<BTreeSet<ItemId>, _>>()
            })
            .transpose()?;
        let explicit = requested.is_some();

        let head = session.fetch()?;
        let now = Utc::now();
        let snapshot = self.ledger.snapshot();
        let candidates = match requested {
            Some(ids) => ids,
            None => self.known_ids()?,
        };

        let mut result = SyncResult::new(String::new());
        let mut staged = Vec::new();
        for id in candidates {
            let entry = snapshot.items.get(&id);
            let observed = match self.observe(&session, &id, entry, head.as_deref(), now) {
                Ok(observed) => observed,
                Err(err) => {
                    result.errors.push(item_error(&id, &err));
                    continue;
                }
            };
            let (Some(outcome), Some(content), Some(hash)) =
                (observed.outcome, observed.local, observed.local_hash)
            else {
                if explicit {
                    let err = SyncError::DagNotFound { item_id: id.clone() };
                    result.errors.push(item_error(&id, &err));
                }
                continue;
            };
            match outcome.item.status {
                SyncStatus::Modified | SyncStatus::Untracked => staged.push(Staged {
                    item: outcome.item,
                    hash,
                    content,
                }),
                SyncStatus::Conflict if explicit => {
                    let err = SyncError::from(ConflictError::from_item(&outcome.item));
                    result.errors.push(item_error(&id, &err));
                }
                _ if explicit => {
                    let err = SyncError::NoChanges {
                        item_id: Some(id.clone()),
                    };
                    result.errors.push(item_error(&id, &err));
                }
                _ => {}
            }
        }

        if staged.is_empty() {
            if result.errors.is_empty() {
                return Err(SyncError::NoChanges { item_id: None });
            }
            result.success = false;
            result.message = "Published 0 DAG(s)".to_string();
            return Ok(result);
        }

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Update {} DAG(s)", staged.len()));
        let changes: Vec<FileChange> = staged
            .iter()
            .map(|s| FileChange::Upsert {
                path: session.config.remote_path(&s.item.item_id),
                content: s.content.clone(),
            })
            .collect();

        checkpoint(cancel)?;
        let pushed = session
            .transport
            .commit(head.as_deref(), &changes, &message, &session.author())
            .and_then(|commit| {
                session
                    .transport
                    .push(session.branch(), &commit)
                    .map(|()| commit)
            });
        let commit = match pushed {
            Ok(commit) => commit,
            Err(err) => {
                tracing::warn!(error = %err, items = staged.len(), "batch publish failed");
                let err = SyncError::from(err);
                for s in &staged {
                    result.errors.push(item_error(&s.item.item_id, &err));
                }
                result.success = false;
                result.message = format!("Failed to publish {} DAG(s)", staged.len());
                return Ok(result);
            }
        };

        self.ledger.update(|state| {
            for Staged { mut item, hash, .. } in staged {
                mark_published(&mut item, &hash, &commit, now);
                result.synced.push(item.item_id.clone());
                state.items.insert(item.item_id.clone(), item);
            }
            state.record_success(Some(commit.clone()), now);
        })?;
        tracing::info!(commit = %commit, items = result.synced.len(), "published batch");

        result.success = result.errors.is_empty();
        result.message = format!("Published {} DAG(s)", result.synced.len());
        Ok(result)
    }
}

fn item_error(id: &ItemId, err: &SyncError) -> ItemError {
    ItemError {
        item_id: id.to_string(),
        message: err.to_string(),
    }
}
