//! Read-only views, configuration and the connection check.
//!
//! Views reconcile against the remote head recorded by the last successful
//! round-trip and never fetch. First-detection timestamps they discover are
//! written back with a compare-and-swap so a concurrent mutating operation
//! always wins.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use chrono::Utc;

use dagsync_core::{
    config, ConnectionResult, OverallStatus, StatusCounts, SummaryStatus, SyncConfig,
    SyncConfigView, SyncItem,
};

use crate::diff::{self, ItemDiff};
use crate::error::SyncError;

use super::{parse_id, SyncCoordinator};

impl SyncCoordinator {
    pub fn status(&self) -> Result<OverallStatus, SyncError> {
        let session = self.session();
        let snapshot = self.ledger.snapshot();
        let mut view = OverallStatus {
            enabled: session.config.enabled,
            repository: session.config.repository.clone(),
            branch: session.config.branch.clone(),
            ..OverallStatus::default()
        };
        if !session.config.enabled {
            return Ok(view);
        }

        let head = snapshot.remote_head.as_deref();
        let now = Utc::now();
        let mut items = BTreeMap::new();
        for id in self.known_ids()? {
            let entry = snapshot.items.get(&id);
            let Some(outcome) = self.observe(&session, &id, entry, head, now)?.outcome else {
                continue;
            };
            if let Some(entry) = entry {
                self.write_back(entry, &outcome.item);
            }
            items.insert(id, outcome.item);
        }

        view.summary = if snapshot.last_error.is_some() {
            SummaryStatus::Error
        } else {
            items
                .values()
                .map(|item| SummaryStatus::from(item.status))
                .max()
                .unwrap_or_default()
        };
        view.counts = StatusCounts::tally(items.values().map(|item| &item.status));
        view.last_sync_at = snapshot.last_sync_at;
        view.last_sync_commit = snapshot.last_sync_commit.clone();
        view.last_sync_status = snapshot.last_sync_status;
        view.last_error = snapshot.last_error.clone();
        view.items = items;
        Ok(view)
    }

    pub fn item_status(&self, id: &str) -> Result<SyncItem, SyncError> {
        let session = self.session();
        session.require_enabled()?;
        let id = parse_id(id)?;
        let snapshot = self.ledger.snapshot();
        let entry = snapshot.items.get(&id);
        let observed = self.observe(&session, &id, entry, snapshot.remote_head.as_deref(), Utc::now())?;
        let Some(outcome) = observed.outcome else {
            return Err(SyncError::DagNotFound { item_id: id });
        };
        if let Some(entry) = entry {
            self.write_back(entry, &outcome.item);
        }
        Ok(outcome.item)
    }

    /// Local content against the content at the last known remote head.
    pub fn item_diff(&self, id: &str) -> Result<ItemDiff, SyncError> {
        let session = self.session();
        session.require_enabled()?;
        let id = parse_id(id)?;
        let snapshot = self.ledger.snapshot();
        let head = snapshot.remote_head.as_deref();
        let entry = snapshot.items.get(&id);
        let observed = self.observe(&session, &id, entry, head, Utc::now())?;
        let (Some(head), Some(remote)) = (head, observed.remote.content) else {
            return Err(SyncError::DagNotFound { item_id: id });
        };

        let path = session.config.remote_path(&id);
        let latest = session
            .transport
            .commits_touching(head, &path, None)?
            .into_iter()
            .next();
        let remote_content = String::from_utf8_lossy(&remote).into_owned();
        let local_content = observed
            .local
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        let unified_diff = diff::unified(
            &path,
            &remote_content,
            local_content.as_deref().unwrap_or_default(),
        );

        Ok(ItemDiff {
            item_id: id,
            file_path: path,
            status: observed.outcome.map(|outcome| outcome.item.status),
            local_content,
            remote_content,
            remote_commit: latest.as_ref().map(|c| c.id.clone()),
            remote_author: latest.as_ref().map(|c| c.author.clone()),
            remote_message: latest.map(|c| c.message),
            unified_diff,
        })
    }

    /// Current configuration with secrets reduced to flags.
    pub fn config(&self) -> SyncConfigView {
        self.session().config.redacted()
    }

    /// Validate and replace the configuration.
    ///
    /// Secrets left out of `next` are kept from the current config when the
    /// auth type is unchanged. The ledger is not touched.
    pub fn update_config(&self, mut next: SyncConfig) -> Result<(), SyncError> {
        let _exclusive = self.lock();
        let current = self.session().config;
        next.inherit_secrets(&current);
        next.validate()?;
        if let Some(home) = &self.config_home {
            config::save_at(home, &next)?;
        }

        let transport = (self.factory)(&next);
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = transport;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        tracing::info!("sync configuration updated");
        Ok(())
    }

    /// Probe the remote. Failures are reported in the result.
    pub fn test_connection(&self) -> ConnectionResult {
        let session = self.session();
        if !session.config.enabled {
            return ConnectionResult {
                success: false,
                message: "Git sync is not enabled".to_string(),
                error: None,
            };
        }
        if let Err(err) = session.config.validate() {
            return ConnectionResult {
                success: false,
                message: "Git sync configuration is invalid".to_string(),
                error: Some(err.to_string()),
            };
        }
        match session.transport.test_reachable() {
            Ok(()) => ConnectionResult {
                success: true,
                message: "Connection successful".to_string(),
                error: None,
            },
            Err(err) => {
                tracing::debug!(error = %err, "connection test failed");
                ConnectionResult {
                    success: false,
                    message: "Connection failed".to_string(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn write_back(&self, expected: &SyncItem, derived: &SyncItem) {
        if let Err(err) = self.ledger.refresh(expected, derived.clone()) {
            tracing::warn!(item_id = %expected.item_id, error = %err, "could not cache derived status");
        }
    }
}
