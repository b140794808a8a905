//! Git transport seam.
//!
//! The engine never speaks the git protocol itself. It needs a handful of
//! primitives (fetch one branch, read a file at a commit, walk commits
//! touching a path, build a commit from file changes, push) and gets them
//! from a [`GitTransport`].
//!
//! - [`git::Git2Transport`]: libgit2 over a local bare mirror.
//! - [`memory::MemoryTransport`]: shared in-process history, for embedding
//!   and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod git;
pub mod memory;

pub use git::Git2Transport;
pub use memory::MemoryTransport;

/// Metadata of one commit that touched an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub author: String,
    /// First line of the commit message.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Commit author / committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// One path-level change in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Upsert { path: String, content: Vec<u8> },
    Delete { path: String },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Upsert { path, .. } | FileChange::Delete { path } => path,
        }
    }
}

/// Categorised transport failure. Never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error during {operation}: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    #[error("authentication failed during {operation}: {message}")]
    Auth {
        operation: &'static str,
        message: String,
    },

    /// The remote refused the update, usually because it moved.
    #[error("push rejected: {message}")]
    Rejected { message: String },

    #[error("git error during {operation}: {message}")]
    Repository {
        operation: &'static str,
        message: String,
    },
}

/// Remote history primitives used by the coordinator.
///
/// Only [`fetch_head`](GitTransport::fetch_head),
/// [`push`](GitTransport::push) and
/// [`test_reachable`](GitTransport::test_reachable) talk to the network; the
/// read methods work on history already fetched.
pub trait GitTransport: Send + Sync {
    /// Fetch `branch` and return its head, `None` for an empty remote.
    fn fetch_head(&self, branch: &str) -> Result<Option<String>, TransportError>;

    /// Content of `path` at `commit`, `None` when the path is absent.
    fn read_at(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// Every file path under `dir` (repository root when empty) at `commit`.
    fn list_files(&self, commit: &str, dir: &str) -> Result<Vec<String>, TransportError>;

    /// Commits reachable from `head` but not from `since` that changed
    /// `path`, newest first.
    fn commits_touching(
        &self,
        head: &str,
        path: &str,
        since: Option<&str>,
    ) -> Result<Vec<CommitInfo>, TransportError>;

    /// Create a commit on top of `parent` (root commit when `None`) without
    /// moving any branch. Returns the new commit id.
    fn commit(
        &self,
        parent: Option<&str>,
        changes: &[FileChange],
        message: &str,
        author: &Author,
    ) -> Result<String, TransportError>;

    /// Fast-forward the remote `branch` to `commit`.
    fn push(&self, branch: &str, commit: &str) -> Result<(), TransportError>;

    /// Cheapest possible round-trip to the remote.
    fn test_reachable(&self) -> Result<(), TransportError>;
}
