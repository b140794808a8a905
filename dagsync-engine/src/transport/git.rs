//! libgit2 transport.
//!
//! Keeps a bare mirror at `<home>/.dagsync/mirror.git`. Fetches land in
//! `refs/remotes/origin/<branch>`; commits are built straight from blobs and
//! a `TreeUpdateBuilder` against the parent tree, so no working tree is ever
//! checked out. The remote is addressed anonymously by URL, which lets a
//! config change point the same mirror at a new repository.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{
    build::TreeUpdateBuilder, Commit, Cred, Direction, ErrorClass, ErrorCode, FetchOptions,
    FileMode, ObjectType, Oid, PushOptions, RemoteCallbacks, Repository, Signature, Sort, Tree,
    TreeWalkMode, TreeWalkResult,
};

use dagsync_core::{AuthConfig, AuthType, SyncConfig};

use super::{Author, CommitInfo, FileChange, GitTransport, TransportError};

/// Credential callbacks give up after this many attempts instead of letting
/// libgit2 loop on a rejected secret.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct Git2Transport {
    url: String,
    auth: AuthConfig,
    mirror: PathBuf,
}

impl Git2Transport {
    pub fn new(config: &SyncConfig, mirror: impl Into<PathBuf>) -> Self {
        Self {
            url: config.repository_url(),
            auth: config.auth.clone(),
            mirror: mirror.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mirror_path(&self) -> &Path {
        &self.mirror
    }

    fn open(&self, operation: &'static str) -> Result<Repository, TransportError> {
        if self.mirror.exists() {
            return Repository::open_bare(&self.mirror).map_err(|e| classify(operation, e));
        }
        if let Some(parent) = self.mirror.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::Repository {
                operation,
                message: format!("create {}: {e}", parent.display()),
            })?;
        }
        tracing::debug!(mirror = %self.mirror.display(), "initialising bare mirror");
        Repository::init_bare(&self.mirror).map_err(|e| classify(operation, e))
    }

    fn callbacks<'cb>(&self) -> RemoteCallbacks<'cb> {
        let auth = self.auth.clone();
        let mut attempts = 0usize;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Net,
                    "credentials rejected by remote",
                ));
            }
            match auth.kind {
                AuthType::Token => {
                    let token = auth.token.as_deref().unwrap_or_default();
                    Cred::userpass_plaintext("git", token)
                }
                AuthType::Ssh => {
                    let user = username_from_url.unwrap_or("git");
                    match auth.ssh_key_path.as_deref() {
                        Some(key) => Cred::ssh_key(user, None, key, auth.ssh_passphrase.as_deref()),
                        None => Cred::ssh_key_from_agent(user),
                    }
                }
                AuthType::None => {
                    if allowed.is_ssh_key() {
                        return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
                    }
                    Cred::default()
                }
            }
        });
        callbacks
    }
}

fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

fn parse_oid(operation: &'static str, id: &str) -> Result<Oid, TransportError> {
    Oid::from_str(id).map_err(|e| classify(operation, e))
}

fn blob_at(tree: &Tree<'_>, path: &str) -> Option<Oid> {
    tree.get_path(Path::new(path))
        .ok()
        .filter(|entry| entry.kind() == Some(ObjectType::Blob))
        .map(|entry| entry.id())
}

fn commit_info(commit: &Commit<'_>) -> CommitInfo {
    CommitInfo {
        id: commit.id().to_string(),
        author: commit.author().name().unwrap_or("unknown").to_string(),
        message: commit
            .message()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string(),
        timestamp: Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_default(),
    }
}

/// Map a libgit2 error onto the transport's categories.
fn classify(operation: &'static str, err: git2::Error) -> TransportError {
    let message = err.message().to_string();
    let lowered = message.to_ascii_lowercase();
    if err.code() == ErrorCode::Auth
        || lowered.contains("authentication")
        || lowered.contains("401")
        || lowered.contains("403")
    {
        return TransportError::Auth { operation, message };
    }
    if err.code() == ErrorCode::NotFastForward
        || lowered.contains("non-fast-forward")
        || lowered.contains("fetch first")
    {
        return TransportError::Rejected { message };
    }
    match err.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
            TransportError::Network { operation, message }
        }
        _ => TransportError::Repository { operation, message },
    }
}

impl GitTransport for Git2Transport {
    fn fetch_head(&self, branch: &str) -> Result<Option<String>, TransportError> {
        let repo = self.open("fetch")?;
        let mut remote = repo
            .remote_anonymous(&self.url)
            .map_err(|e| classify("fetch", e))?;
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());

        let tracking = tracking_ref(branch);
        let refspec = format!("+refs/heads/{branch}:{tracking}");
        remote
            .fetch(&[refspec.as_str()], Some(&mut options), None)
            .map_err(|e| classify("fetch", e))?;

        match repo.refname_to_id(&tracking) {
            Ok(oid) => Ok(Some(oid.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(classify("fetch", e)),
        }
    }

    fn read_at(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let repo = self.open("read")?;
        let commit = repo
            .find_commit(parse_oid("read", commit)?)
            .map_err(|e| classify("read", e))?;
        let tree = commit.tree().map_err(|e| classify("read", e))?;
        let Some(oid) = blob_at(&tree, path) else {
            return Ok(None);
        };
        let blob = repo.find_blob(oid).map_err(|e| classify("read", e))?;
        Ok(Some(blob.content().to_vec()))
    }

    fn list_files(&self, commit: &str, dir: &str) -> Result<Vec<String>, TransportError> {
        let repo = self.open("list")?;
        let commit = repo
            .find_commit(parse_oid("list", commit)?)
            .map_err(|e| classify("list", e))?;
        let tree = commit.tree().map_err(|e| classify("list", e))?;

        let dir = dir.trim_matches('/');
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{root}{name}"));
                }
            }
            TreeWalkResult::Ok
        })
        .map_err(|e| classify("list", e))?;

        files.retain(|path| {
            dir.is_empty()
                || path
                    .strip_prefix(dir)
                    .is_some_and(|rest| rest.starts_with('/'))
        });
        files.sort();
        Ok(files)
    }

    fn commits_touching(
        &self,
        head: &str,
        path: &str,
        since: Option<&str>,
    ) -> Result<Vec<CommitInfo>, TransportError> {
        let repo = self.open("log")?;
        let mut walk = repo.revwalk().map_err(|e| classify("log", e))?;
        walk.push(parse_oid("log", head)?)
            .map_err(|e| classify("log", e))?;
        if let Some(since) = since {
            let oid = parse_oid("log", since)?;
            // a baseline from another repository is simply not hidden
            if repo.find_commit(oid).is_ok() {
                walk.hide(oid).map_err(|e| classify("log", e))?;
            }
        }
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(|e| classify("log", e))?;

        let mut touching = Vec::new();
        for oid in walk {
            let oid = oid.map_err(|e| classify("log", e))?;
            let commit = repo.find_commit(oid).map_err(|e| classify("log", e))?;
            let tree = commit.tree().map_err(|e| classify("log", e))?;
            let now = blob_at(&tree, path);
            let before = match commit.parent(0) {
                Ok(parent) => {
                    let parent_tree = parent.tree().map_err(|e| classify("log", e))?;
                    blob_at(&parent_tree, path)
                }
                Err(_) => None,
            };
            if now != before {
                touching.push(commit_info(&commit));
            }
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
        let repo = self.open("commit")?;
        let parent = parent
            .map(|id| {
                parse_oid("commit", id)
                    .and_then(|oid| repo.find_commit(oid).map_err(|e| classify("commit", e)))
            })
            .transpose()?;

        let base = match &parent {
            Some(commit) => commit.tree().map_err(|e| classify("commit", e))?,
            None => {
                let empty = repo
                    .treebuilder(None)
                    .and_then(|builder| builder.write())
                    .map_err(|e| classify("commit", e))?;
                repo.find_tree(empty).map_err(|e| classify("commit", e))?
            }
        };

        let mut update = TreeUpdateBuilder::new();
        for change in changes {
            match change {
                FileChange::Upsert { path, content } => {
                    let blob = repo.blob(content).map_err(|e| classify("commit", e))?;
                    update.upsert(path.as_str(), blob, FileMode::Blob);
                }
                FileChange::Delete { path } => {
                    update.remove(path.as_str());
                }
            }
        }
        let tree_oid = update
            .create_updated(&repo, &base)
            .map_err(|e| classify("commit", e))?;
        let tree = repo.find_tree(tree_oid).map_err(|e| classify("commit", e))?;

        let signature =
            Signature::now(&author.name, &author.email).map_err(|e| classify("commit", e))?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = repo
            .commit(None, &signature, &signature, message, &tree, &parents)
            .map_err(|e| classify("commit", e))?;
        Ok(oid.to_string())
    }

    fn push(&self, branch: &str, commit: &str) -> Result<(), TransportError> {
        let repo = self.open("push")?;
        let oid = parse_oid("push", commit)?;
        let local = format!("refs/heads/{branch}");
        repo.reference(&local, oid, true, "dagsync: publish")
            .map_err(|e| classify("push", e))?;

        let rejected: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut remote = repo
                .remote_anonymous(&self.url)
                .map_err(|e| classify("push", e))?;
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(msg) = status {
                    *rejected.borrow_mut() = Some(msg.to_string());
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("{local}:{local}");
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| classify("push", e))?;
        }

        if let Some(message) = rejected.into_inner() {
            return Err(TransportError::Rejected { message });
        }

        repo.reference(&tracking_ref(branch), oid, true, "dagsync: pushed")
            .map_err(|e| classify("push", e))?;
        Ok(())
    }

    fn test_reachable(&self) -> Result<(), TransportError> {
        let repo = self.open("connect")?;
        let mut remote = repo
            .remote_anonymous(&self.url)
            .map_err(|e| classify("connect", e))?;
        // an empty remote advertises no refs, so a successful handshake is
        // the whole check
        let mut connection = remote
            .connect_auth(Direction::Fetch, Some(self.callbacks()), None)
            .map_err(|e| classify("connect", e))?;
        if !connection.connected() {
            return Err(TransportError::Network {
                operation: "connect",
                message: format!("no connection to {}", self.url),
            });
        }
        connection
            .remote()
            .disconnect()
            .map_err(|e| classify("connect", e))?;
        Ok(())
    }
}
