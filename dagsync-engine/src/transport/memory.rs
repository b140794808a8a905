//! In-process transport over a shared, linear commit history.
//!
//! Clones share one remote, so two coordinators built from clones of the
//! same `MemoryTransport` behave like two machines pushing to one
//! repository.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::hash::content_hash;

use super::{Author, CommitInfo, FileChange, GitTransport, TransportError};

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    remote: Arc<Mutex<Remote>>,
}

#[derive(Debug, Default)]
struct Remote {
    commits: HashMap<String, StoredCommit>,
    branches: HashMap<String, String>,
    seq: u64,
    offline: Option<TransportError>,
    reject_next_push: Option<TransportError>,
    fetches: usize,
    pushes: usize,
}

#[derive(Debug, Clone)]
struct StoredCommit {
    parent: Option<String>,
    files: BTreeMap<String, Vec<u8>>,
    info: CommitInfo,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn remote(&self) -> MutexGuard<'_, Remote> {
        self.remote.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit `changes` directly on `branch`, as another writer would.
    pub fn push_commit(
        &self,
        branch: &str,
        changes: &[FileChange],
        message: &str,
        author: &str,
    ) -> Result<String, TransportError> {
        let parent = self.head(branch);
        let author = Author {
            name: author.to_string(),
            email: format!("{author}@example.com"),
        };
        let id = self.commit(parent.as_deref(), changes, message, &author)?;
        self.remote().branches.insert(branch.to_string(), id.clone());
        Ok(id)
    }

    /// Current head of `branch` without counting as a fetch.
    pub fn head(&self, branch: &str) -> Option<String> {
        self.remote().branches.get(branch).cloned()
    }

    /// File content at the head of `branch`.
    pub fn file_at_head(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let remote = self.remote();
        let head = remote.branches.get(branch)?;
        remote.commits.get(head)?.files.get(path).cloned()
    }

    /// Make every network call fail with `error` until cleared with `None`.
    pub fn set_offline(&self, error: Option<TransportError>) {
        self.remote().offline = error;
    }

    /// Reject the next push with `error`.
    pub fn reject_next_push(&self, error: TransportError) {
        self.remote().reject_next_push = Some(error);
    }

    pub fn fetch_count(&self) -> usize {
        self.remote().fetches
    }

    pub fn push_count(&self) -> usize {
        self.remote().pushes
    }
}

impl Remote {
    fn commit(&self, id: &str, operation: &'static str) -> Result<&StoredCommit, TransportError> {
        self.commits.get(id).ok_or_else(|| TransportError::Repository {
            operation,
            message: format!("unknown commit {id}"),
        })
    }

    fn is_ancestor<'a>(&'a self, ancestor: &str, mut cursor: Option<&'a str>) -> bool {
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.commits.get(id).and_then(|c| c.parent.as_deref());
        }
        false
    }
}

impl GitTransport for MemoryTransport {
    fn fetch_head(&self, branch: &str) -> Result<Option<String>, TransportError> {
        let mut remote = self.remote();
        if let Some(err) = &remote.offline {
            return Err(err.clone());
        }
        remote.fetches += 1;
        Ok(remote.branches.get(branch).cloned())
    }

    fn read_at(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let remote = self.remote();
        Ok(remote.commit(commit, "read")?.files.get(path).cloned())
    }

    fn list_files(&self, commit: &str, dir: &str) -> Result<Vec<String>, TransportError> {
        let remote = self.remote();
        let files = &remote.commit(commit, "list")?.files;
        let dir = dir.trim_matches('/');
        Ok(files
            .keys()
            .filter(|path| {
                dir.is_empty()
                    || path
                        .strip_prefix(dir)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .cloned()
            .collect())
    }

    fn commits_touching(
        &self,
        head: &str,
        path: &str,
        since: Option<&str>,
    ) -> Result<Vec<CommitInfo>, TransportError> {
        let remote = self.remote();
        let mut touching = Vec::new();
        let mut cursor = Some(remote.commit(head, "log")?);
        while let Some(commit) = cursor {
            if Some(commit.info.id.as_str()) == since {
                break;
            }
            let parent = commit
                .parent
                .as_deref()
                .map(|id| remote.commit(id, "log"))
                .transpose()?;
            let before = parent.and_then(|p| p.files.get(path));
            if commit.files.get(path) != before {
                touching.push(commit.info.clone());
            }
            cursor = parent;
        }
        Ok(touching)
    }

    fn commit(
        &self,
        parent: Option<&str>,
        changes: &[FileChange],
        message: &str,
        author: &Author,
    ) -> Result<String, TransportError> {
        let mut remote = self.remote();
        let mut files = match parent {
            Some(id) => remote.commit(id, "commit")?.files.clone(),
            None => BTreeMap::new(),
        };
        for change in changes {
            match change {
                FileChange::Upsert { path, content } => {
                    files.insert(path.clone(), content.clone());
                }
                FileChange::Delete { path } => {
                    files.remove(path);
                }
            }
        }

        remote.seq += 1;
        let seed = format!("{}:{}:{message}", remote.seq, parent.unwrap_or_default());
        let id = content_hash(seed.as_bytes())[..40].to_string();
        let info = CommitInfo {
            id: id.clone(),
            author: author.name.clone(),
            message: message.lines().next().unwrap_or_default().to_string(),
            timestamp: Utc::now(),
        };
        remote.commits.insert(
            id.clone(),
            StoredCommit {
                parent: parent.map(str::to_string),
                files,
                info,
            },
        );
        Ok(id)
    }

    fn push(&self, branch: &str, commit: &str) -> Result<(), TransportError> {
        let mut remote = self.remote();
        if let Some(err) = &remote.offline {
            return Err(err.clone());
        }
        if let Some(err) = remote.reject_next_push.take() {
            return Err(err);
        }
        let start = remote.commit(commit, "push")?.info.id.clone();
        if let Some(current) = remote.branches.get(branch) {
            if !remote.is_ancestor(current, Some(&start)) {
                return Err(TransportError::Rejected {
                    message: format!("non-fast-forward update of {branch}"),
                });
            }
        }
        remote.pushes += 1;
        remote.branches.insert(branch.to_string(), start);
        Ok(())
    }

    fn test_reachable(&self) -> Result<(), TransportError> {
        match &self.remote().offline {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
