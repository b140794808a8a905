//! Status ledger: persisted per-item sync state.
//!
//! One `LedgerState` JSON document at `<home>/.dagsync/ledger.json`. The
//! in-memory copy is an `Arc` snapshot; every write clones it, applies the
//! change, flushes the clone (`.tmp` + fsync + rename) and only then swaps it
//! in. A failed flush leaves both disk and memory at the previous state.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dagsync_core::{ItemId, LastSyncStatus, StatusCounts, SyncItem};

use crate::error::{io_err, SyncError};

pub const LEDGER_VERSION: u32 = 1;

/// On-disk ledger payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default = "ledger_version")]
    pub version: u32,
    /// Remote head as of the last successful fetch or push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_status: Option<LastSyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Older ledgers keyed the map as `dags`.
    #[serde(default, alias = "dags")]
    pub items: BTreeMap<ItemId, SyncItem>,
}

fn ledger_version() -> u32 {
    LEDGER_VERSION
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            remote_head: None,
            last_sync_at: None,
            last_sync_commit: None,
            last_sync_status: None,
            last_error: None,
            items: BTreeMap::new(),
        }
    }
}

impl LedgerState {
    /// Record a successful remote round-trip that ended at `head`.
    pub fn record_success(&mut self, head: Option<String>, now: DateTime<Utc>) {
        self.remote_head = head.clone();
        self.last_sync_at = Some(now);
        self.last_sync_commit = head;
        self.last_sync_status = Some(LastSyncStatus::Success);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.last_sync_at = Some(now);
        self.last_sync_status = Some(LastSyncStatus::Error);
        self.last_error = Some(error.to_string());
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(self.items.values().map(|item| &item.status))
    }
}

/// Durable, snapshot-readable ledger handle.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    state: RwLock<Arc<LedgerState>>,
    writer: Mutex<()>,
}

impl Ledger {
    /// Load the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let state = load(&path)?;
        Ok(Self {
            path,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consistent point-in-time view. Never blocks on an in-flight flush.
    pub fn snapshot(&self) -> Arc<LedgerState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &ItemId) -> Option<SyncItem> {
        self.snapshot().items.get(id).cloned()
    }

    pub fn list(&self) -> Vec<SyncItem> {
        self.snapshot().items.values().cloned().collect()
    }

    pub fn counts(&self) -> StatusCounts {
        self.snapshot().counts()
    }

    pub fn put(&self, item: SyncItem) -> Result<(), SyncError> {
        self.update(|state| {
            state.items.insert(item.item_id.clone(), item);
        })
    }

    pub fn delete(&self, id: &ItemId) -> Result<Option<SyncItem>, SyncError> {
        self.update(|state| state.items.remove(id))
    }

    /// Apply `change` as one all-or-nothing transaction.
    pub fn update<R>(&self, change: impl FnOnce(&mut LedgerState) -> R) -> Result<R, SyncError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*self.snapshot()).clone();
        let out = change(&mut next);
        save(&self.path, &next)?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(out)
    }

    /// Replace `expected` with `updated` only if the stored entry still
    /// equals `expected`. Used by read paths to record first-detection
    /// timestamps without racing a concurrent mutating operation.
    pub fn refresh(&self, expected: &SyncItem, updated: SyncItem) -> Result<bool, SyncError> {
        if expected == &updated {
            return Ok(false);
        }
        self.update(|state| match state.items.get(&expected.item_id) {
            Some(current) if current == expected => {
                state.items.insert(updated.item_id.clone(), updated);
                true
            }
            _ => false,
        })
    }
}

fn load(path: &Path) -> Result<LedgerState, SyncError> {
    if !path.exists() {
        return Ok(LedgerState::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

fn save(path: &Path, state: &LedgerState) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid ledger path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(&json)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
