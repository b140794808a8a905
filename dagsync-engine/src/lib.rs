//! # dagsync-engine
//!
//! Git-backed synchronization of DAG, skill, soul and memory items.
//!
//! Build a [`SyncCoordinator`] (usually with [`SyncCoordinator::open_at`])
//! and call its operations: [`pull`](SyncCoordinator::pull),
//! [`publish`](SyncCoordinator::publish),
//! [`publish_all`](SyncCoordinator::publish_all),
//! [`discard`](SyncCoordinator::discard), [`forget`](SyncCoordinator::forget),
//! [`cleanup`](SyncCoordinator::cleanup), [`delete`](SyncCoordinator::delete),
//! [`delete_all_missing`](SyncCoordinator::delete_all_missing),
//! [`move_item`](SyncCoordinator::move_item) and the read-only views.

pub mod conflict;
pub mod coordinator;
pub mod diff;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod reconcile;
pub mod store;
pub mod transport;

pub use conflict::ConflictError;
pub use coordinator::{SyncCoordinator, TransportFactory};
pub use diff::ItemDiff;
pub use error::SyncError;
pub use ledger::{Ledger, LedgerState};
pub use store::{ContentStore, FsContentStore};
pub use transport::{
    Author, CommitInfo, FileChange, Git2Transport, GitTransport, MemoryTransport, TransportError,
};

pub use tokio_util::sync::CancellationToken;
