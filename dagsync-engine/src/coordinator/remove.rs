//! Operations that remove or re-key items on all three surfaces: remote
//! branch, content store and ledger, in that order.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use dagsync_core::{ItemId, SyncStatus, ValidationError};

use crate::conflict::{self, mark_published};
use crate::error::SyncError;
use crate::hash::content_hash;
use crate::reconcile::{reconcile, RemoteView};
use crate::transport::FileChange;

use super::{checkpoint, parse_id, SyncCoordinator};

impl SyncCoordinator {
    /// Delete a published item remotely, then locally, then from the ledger.
    pub fn delete(
        &self,
        cancel: &CancellationToken,
        id: &str,
        message: Option<&str>,
        force: bool,
    ) -> Result<(), SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_push()?;
        let id = parse_id(id)?;

        let Some(entry) = self.ledger.get(&id) else {
            if self.store.get(&id)?.is_some() {
                return Err(SyncError::CannotDeleteUntracked { item_id: id });
            }
            return Err(SyncError::DagNotFound { item_id: id });
        };
        if !entry.has_baseline() {
            return Err(SyncError::CannotDeleteUntracked { item_id: id });
        }

        let head = session.fetch()?;
        let now = Utc::now();
        let observed = self.observe(&session, &id, Some(&entry), head.as_deref(), now)?;
        let item = observed.outcome.map_or(entry, |outcome| outcome.item);
        conflict::check(&item, force)?;
        if item.status == SyncStatus::Modified && !force {
            return Err(ValidationError::new(
                "force",
                format!("'{id}' has unpublished local changes; deleting it requires force"),
            )
            .into());
        }

        checkpoint(cancel)?;
        let commit = if observed.remote.content.is_some() {
            let message = message
                .map(str::to_string)
                .unwrap_or_else(|| format!("Delete {id}"));
            let changes = [FileChange::Delete {
                path: session.config.remote_path(&id),
            }];
            let commit = session
                .transport
                .commit(head.as_deref(), &changes, &message, &session.author())?;
            session.transport.push(session.branch(), &commit)?;
            Some(commit)
        } else {
            None
        };

        // the remote no longer has the item; the ledger follows even if the
        // local removal fails
        let local = self.store.delete(&id);
        self.ledger.update(|state| {
            state.items.remove(&id);
            if let Some(commit) = &commit {
                state.record_success(Some(commit.clone()), now);
            }
        })?;
        if let Err(err) = local {
            tracing::warn!(item_id = %id, error = %err, "deleted remotely but local file remains");
            return Err(err);
        }
        tracing::info!(item_id = %id, commit = commit.as_deref().unwrap_or("-"), "deleted");
        Ok(())
    }

    /// Delete every `Missing` item from the remote in one commit and drop
    /// their ledger entries.
    pub fn delete_all_missing(
        &self,
        cancel: &CancellationToken,
        message: Option<&str>,
    ) -> Result<Vec<ItemId>, SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_push()?;

        let snapshot = self.ledger.snapshot();
        let mut missing = Vec::new();
        for id in snapshot.items.keys() {
            if self.store.get(id)?.is_none() {
                missing.push(id.clone());
            }
        }
        if missing.is_empty() {
            return Ok(missing);
        }

        let head = session.fetch()?;
        let mut changes = Vec::new();
        for id in &missing {
            let published = snapshot
                .items
                .get(id)
                .is_some_and(|entry| entry.has_baseline());
            if published && session.exists_at(id, head.as_deref())? {
                changes.push(FileChange::Delete {
                    path: session.config.remote_path(id),
                });
            }
        }

        checkpoint(cancel)?;
        let now = Utc::now();
        let commit = if changes.is_empty() {
            None
        } else {
            let message = message
                .map(str::to_string)
                .unwrap_or_else(|| format!("Delete {} missing DAG(s)", changes.len()));
            let commit = session
                .transport
                .commit(head.as_deref(), &changes, &message, &session.author())?;
            session.transport.push(session.branch(), &commit)?;
            Some(commit)
        };

        self.ledger.update(|state| {
            for id in &missing {
                state.items.remove(id);
            }
            if let Some(commit) = &commit {
                state.record_success(Some(commit.clone()), now);
            }
        })?;
        tracing::info!(count = missing.len(), commit = commit.as_deref().unwrap_or("-"), "deleted missing items");
        Ok(missing)
    }

    /// Rename an item on the remote, locally and in the ledger.
    ///
    /// Works before the local rename (the old file still exists) and after
    /// it (the old file is gone and an untracked file sits at `new_id`).
    pub fn move_item(
        &self,
        cancel: &CancellationToken,
        old_id: &str,
        new_id: &str,
        message: Option<&str>,
        force: bool,
    ) -> Result<(), SyncError> {
        let _exclusive = self.lock();
        let session = self.session();
        session.require_push()?;
        let old = parse_id(old_id)?;
        let new = parse_id(new_id)?;
        if old == new {
            return Err(ValidationError::new("new_id", "must differ from the current id").into());
        }
        if old.kind() != new.kind() {
            return Err(ValidationError::new(
                "new_id",
                format!("must name a {} like '{old}'", old.kind()),
            )
            .into());
        }

        let snapshot = self.ledger.snapshot();
        let old_local = self.store.get(&old)?;
        let new_local = self.store.get(&new)?;
        let new_entry = snapshot.items.get(&new);
        let taken = || -> SyncError {
            ValidationError::new("new_id", format!("'{new}' already exists")).into()
        };

        let retroactive = old_local.is_none();
        let content = match (old_local, new_local) {
            (Some(_), Some(_)) => return Err(taken()),
            (Some(content), None) if new_entry.is_none() => content,
            (Some(_), None) => return Err(taken()),
            (None, Some(content)) if new_entry.map_or(true, |e| !e.has_baseline()) => content,
            (None, Some(_)) => return Err(taken()),
            (None, None) => return Err(SyncError::DagNotFound { item_id: old }),
        };
        let Some(entry) = snapshot.items.get(&old).filter(|e| e.has_baseline()) else {
            return Err(ValidationError::new(
                "old_id",
                format!("'{old}' was never published; rename the file locally instead"),
            )
            .into());
        };

        let head = session.fetch()?;
        let now = Utc::now();
        if session.exists_at(&new, head.as_deref())? {
            return Err(taken());
        }

        let hash = content_hash(&content);
        let remote = session.remote_item(&old, head.as_deref(), entry.base_commit.as_deref())?;
        let view = RemoteView {
            head: head.as_deref(),
            hash: remote.hash.as_deref(),
            newer: remote.newer.as_ref(),
        };
        if let Some(outcome) = reconcile(&old, Some(entry), Some(&hash), &view, now) {
            conflict::check(&outcome.item, force)?;
        }

        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Move {old} to {new}"));
        let mut changes = Vec::with_capacity(2);
        if remote.content.is_some() {
            changes.push(FileChange::Delete {
                path: session.config.remote_path(&old),
            });
        }
        changes.push(FileChange::Upsert {
            path: session.config.remote_path(&new),
            content: content.clone(),
        });

        checkpoint(cancel)?;
        let commit = session
            .transport
            .commit(head.as_deref(), &changes, &message, &session.author())?;
        session.transport.push(session.branch(), &commit)?;

        let local = if retroactive {
            Ok(())
        } else {
            self.store
                .put(&new, &content)
                .and_then(|()| self.store.delete(&old).map(|_| ()))
        };

        let mut item = entry.clone();
        item.item_id = new.clone();
        item.kind = new.kind();
        mark_published(&mut item, &hash, &commit, now);
        self.ledger.update(|state| {
            state.items.remove(&old);
            state.items.insert(new.clone(), item);
            state.record_success(Some(commit.clone()), now);
        })?;
        if let Err(err) = local {
            tracing::warn!(from = %old, to = %new, error = %err, "moved remotely but local rename failed");
            return Err(err);
        }
        tracing::info!(from = %old, to = %new, commit = %commit, retroactive, "moved");
        Ok(())
    }
}
