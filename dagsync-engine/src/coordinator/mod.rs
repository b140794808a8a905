//! `SyncCoordinator`: the public operation surface.
//!
//! Every mutating operation (and `update_config`) runs under one exclusive
//! lock per coordinator. Read-only views work from a ledger snapshot and
//! never wait on it.
//!
//! Cancellation is cooperative: each operation checks its token before the
//! point of no return (the remote push, or the first local write for
//! operations that never push). After that the operation runs to the end so
//! the ledger always reflects a remote write that happened.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use dagsync_core::{config, paths, ItemId, SyncConfig, SyncItem};

use crate::error::SyncError;
use crate::hash::content_hash;
use crate::ledger::Ledger;
use crate::reconcile::{reconcile, Reconciliation, RemoteView};
use crate::store::{ContentStore, FsContentStore};
use crate::transport::{Author, CommitInfo, Git2Transport, GitTransport};

mod local;
mod publish;
mod pull;
mod remove;
mod status;

/// Builds the transport for a given configuration. Called again whenever
/// `update_config` replaces the configuration.
pub type TransportFactory = Box<dyn Fn(&SyncConfig) -> Arc<dyn GitTransport> + Send + Sync>;

pub struct SyncCoordinator {
    config: RwLock<Arc<SyncConfig>>,
    /// Where `update_config` persists; `None` keeps config in memory only.
    config_home: Option<PathBuf>,
    transport: RwLock<Arc<dyn GitTransport>>,
    factory: TransportFactory,
    store: Arc<dyn ContentStore>,
    ledger: Ledger,
    exclusive: Mutex<()>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config_home", &self.config_home)
            .field("ledger", &self.ledger.path())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn ContentStore>,
        ledger: Ledger,
        factory: TransportFactory,
    ) -> Self {
        let transport = factory(&config);
        Self {
            config: RwLock::new(Arc::new(config)),
            config_home: None,
            transport: RwLock::new(transport),
            factory,
            store,
            ledger,
            exclusive: Mutex::new(()),
        }
    }

    /// Coordinator that keeps using `transport` across config updates.
    pub fn with_transport(
        config: SyncConfig,
        store: Arc<dyn ContentStore>,
        ledger: Ledger,
        transport: Arc<dyn GitTransport>,
    ) -> Self {
        Self::new(
            config,
            store,
            ledger,
            Box::new(move |_: &SyncConfig| transport.clone()),
        )
    }

    /// Persist accepted `update_config` calls under `home`.
    pub fn persist_config_at(mut self, home: impl Into<PathBuf>) -> Self {
        self.config_home = Some(home.into());
        self
    }

    /// Standard on-disk setup under `home`: config and ledger from
    /// `~/.dagsync`, items from `items_dir` (default `~/.dagsync/items`),
    /// libgit2 transport over `~/.dagsync/mirror.git`.
    pub fn open_at(home: &Path, items_dir: Option<PathBuf>) -> Result<Self, SyncError> {
        let config = config::load_at(home)?;
        let ledger = Ledger::open(paths::ledger_path_at(home))?;
        let items = items_dir.unwrap_or_else(|| paths::items_dir_at(home));
        let mirror = paths::mirror_path_at(home);
        tracing::debug!(items = %items.display(), mirror = %mirror.display(), "opening coordinator");

        let factory: TransportFactory = Box::new(move |config: &SyncConfig| {
            Arc::new(Git2Transport::new(config, mirror.clone())) as Arc<dyn GitTransport>
        });
        Ok(Self::new(config, Arc::new(FsContentStore::new(items)), ledger, factory)
            .persist_config_at(home))
    }

    /// `open_at` convenience wrapper.
    pub fn open(items_dir: Option<PathBuf>) -> Result<Self, SyncError> {
        Self::open_at(&paths::home()?, items_dir)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Config and transport captured once per operation.
struct Session {
    config: Arc<SyncConfig>,
    transport: Arc<dyn GitTransport>,
}

/// Remote side of one item at a given head.
#[derive(Debug, Default)]
struct RemoteItem {
    content: Option<Vec<u8>>,
    hash: Option<String>,
    newer: Option<CommitInfo>,
}

/// Everything known about one item at one point in time.
#[derive(Debug)]
struct Observed {
    local: Option<Vec<u8>>,
    local_hash: Option<String>,
    remote: RemoteItem,
    outcome: Option<Reconciliation>,
}

impl SyncCoordinator {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.exclusive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Session {
        Session {
            config: self
                .config
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            transport: self
                .transport
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Items present locally or in the ledger, sorted.
    fn known_ids(&self) -> Result<BTreeSet<ItemId>, SyncError> {
        let mut ids: BTreeSet<ItemId> = self.ledger.snapshot().items.keys().cloned().collect();
        ids.extend(self.store.list()?);
        Ok(ids)
    }

    /// Read local and remote state for `id` and reconcile it.
    fn observe(
        &self,
        session: &Session,
        id: &ItemId,
        entry: Option<&SyncItem>,
        head: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Observed, SyncError> {
        let local = self.store.get(id)?;
        let local_hash = local.as_deref().map(content_hash);
        let base = entry
            .filter(|entry| entry.has_baseline())
            .and_then(|entry| entry.base_commit.as_deref());
        let remote = session.remote_item(id, head, base)?;
        let outcome = reconcile(
            id,
            entry,
            local_hash.as_deref(),
            &RemoteView {
                head,
                hash: remote.hash.as_deref(),
                newer: remote.newer.as_ref(),
            },
            now,
        );
        Ok(Observed {
            local,
            local_hash,
            remote,
            outcome,
        })
    }
}

impl Session {
    fn require_enabled(&self) -> Result<(), SyncError> {
        if !self.config.enabled {
            return Err(SyncError::NotEnabled);
        }
        Ok(())
    }

    fn require_push(&self) -> Result<(), SyncError> {
        self.require_enabled()?;
        if !self.config.push_enabled {
            return Err(SyncError::PushDisabled);
        }
        Ok(())
    }

    fn branch(&self) -> &str {
        &self.config.branch
    }

    fn author(&self) -> Author {
        Author {
            name: self.config.commit.author_name.clone(),
            email: self.config.commit.author_email.clone(),
        }
    }

    fn fetch(&self) -> Result<Option<String>, SyncError> {
        let head = self.transport.fetch_head(self.branch())?;
        tracing::debug!(branch = %self.branch(), head = head.as_deref().unwrap_or("-"), "fetched");
        Ok(head)
    }

    fn remote_item(
        &self,
        id: &ItemId,
        head: Option<&str>,
        base: Option<&str>,
    ) -> Result<RemoteItem, SyncError> {
        let Some(head) = head else {
            return Ok(RemoteItem::default());
        };
        let path = self.config.remote_path(id);
        let content = self.transport.read_at(head, &path)?;
        let newer = match base {
            Some(base) if base != head => self
                .transport
                .commits_touching(head, &path, Some(base))?
                .into_iter()
                .next(),
            _ => None,
        };
        Ok(RemoteItem {
            hash: content.as_deref().map(content_hash),
            content,
            newer,
        })
    }

    /// Whether `id` has a file at `head`.
    fn exists_at(&self, id: &ItemId, head: Option<&str>) -> Result<bool, SyncError> {
        match head {
            Some(head) => Ok(self
                .transport
                .read_at(head, &self.config.remote_path(id))?
                .is_some()),
            None => Ok(false),
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<ItemId, SyncError> {
    Ok(ItemId::parse(raw)?)
}
