use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dagsync_core::{ItemId, SummaryStatus, SyncConfig, SyncStatus};
use dagsync_engine::{
    CancellationToken, ContentStore, FileChange, FsContentStore, Ledger, MemoryTransport,
    SyncCoordinator, SyncError, TransportError,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Machine {
    dir: TempDir,
    config: SyncConfig,
    remote: MemoryTransport,
    coordinator: SyncCoordinator,
}

fn enabled_config() -> SyncConfig {
    SyncConfig {
        enabled: true,
        repository: "github.com/acme/dags".to_string(),
        path: "dags".to_string(),
        ..SyncConfig::default()
    }
}

fn machine() -> Machine {
    machine_on(MemoryTransport::new(), enabled_config())
}

fn machine_on(remote: MemoryTransport, config: SyncConfig) -> Machine {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(FsContentStore::new(dir.path().join("items")));
    machine_with(dir, store, remote, config)
}

fn machine_with(
    dir: TempDir,
    store: Arc<dyn ContentStore>,
    remote: MemoryTransport,
    config: SyncConfig,
) -> Machine {
    let ledger = Ledger::open(dir.path().join("ledger.json")).expect("ledger");
    let coordinator =
        SyncCoordinator::with_transport(config.clone(), store, ledger, Arc::new(remote.clone()));
    Machine {
        dir,
        config,
        remote,
        coordinator,
    }
}

impl Machine {
    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join("items").join(rel)
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write item");
    }

    fn read(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.path(rel)).ok()
    }

    fn status_of(&self, id: &str) -> SyncStatus {
        self.coordinator.item_status(id).expect("item status").status
    }

    fn remote_file(&self, path: &str) -> Option<String> {
        self.remote
            .file_at_head("main", path)
            .map(|bytes| String::from_utf8(bytes).expect("utf8"))
    }

    fn publish(&self, id: &str) {
        self.coordinator
            .publish(&CancellationToken::new(), id, None, false)
            .expect("publish");
    }
}

/// Filesystem store whose writes can be switched off.
struct FlakyStore {
    inner: FsContentStore,
    broken: AtomicBool,
}

impl FlakyStore {
    fn fail_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    fn check(&self, id: &ItemId) -> Result<(), SyncError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(SyncError::Io {
                path: self.inner.path_for(id),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            });
        }
        Ok(())
    }
}

impl ContentStore for FlakyStore {
    fn get(&self, id: &ItemId) -> Result<Option<Vec<u8>>, SyncError> {
        self.inner.get(id)
    }

    fn put(&self, id: &ItemId, content: &[u8]) -> Result<(), SyncError> {
        self.check(id)?;
        self.inner.put(id, content)
    }

    fn delete(&self, id: &ItemId) -> Result<bool, SyncError> {
        self.check(id)?;
        self.inner.delete(id)
    }

    fn list(&self) -> Result<Vec<ItemId>, SyncError> {
        self.inner.list()
    }
}

fn flaky_machine() -> (Machine, Arc<FlakyStore>) {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(FlakyStore {
        inner: FsContentStore::new(dir.path().join("items")),
        broken: AtomicBool::new(false),
    });
    let m = machine_with(dir, store.clone(), MemoryTransport::new(), enabled_config());
    (m, store)
}

fn id(raw: &str) -> ItemId {
    ItemId::parse(raw).expect("item id")
}

fn upsert(path: &str, content: &str) -> FileChange {
    FileChange::Upsert {
        path: path.to_string(),
        content: content.as_bytes().to_vec(),
    }
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

#[test]
fn pull_writes_remote_items_and_is_idempotent() {
    let m = machine();
    m.remote
        .push_commit(
            "main",
            &[
                upsert("dags/etl.yaml", "steps: []\n"),
                upsert("dags/skills/sql.md", "# sql\n"),
                upsert("README.md", "not an item\n"),
            ],
            "seed",
            "bob",
        )
        .expect("seed");

    let first = m.coordinator.pull(&token()).expect("pull");
    assert!(first.success);
    assert_eq!(first.synced, vec![id("etl"), id("skills/sql")]);
    assert_eq!(first.message, "Synced 2 DAG(s)");
    assert_eq!(m.read("etl.yaml").as_deref(), Some("steps: []\n"));
    assert_eq!(m.read("skills/sql.md").as_deref(), Some("# sql\n"));

    let items_after_first = m.coordinator.ledger().snapshot().items.clone();
    let second = m.coordinator.pull(&token()).expect("pull again");
    assert!(second.success);
    assert!(second.synced.is_empty());
    assert_eq!(second.message, "Already up to date");
    assert_eq!(m.coordinator.ledger().snapshot().items, items_after_first);
}

#[test]
fn pull_takes_remote_edit_of_unchanged_item() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    m.remote
        .push_commit("main", &[upsert("dags/etl.yaml", "v2\n")], "bump", "bob")
        .expect("remote edit");

    let result = m.coordinator.pull(&token()).expect("pull");
    assert_eq!(result.synced, vec![id("etl")]);
    assert_eq!(m.read("etl.yaml").as_deref(), Some("v2\n"));

    let item = m.coordinator.item_status("etl").expect("status");
    assert_eq!(item.status, SyncStatus::Synced);
    assert_eq!(item.base_commit, m.remote.head("main"));
}

#[test]
fn pull_keeps_local_edits_and_reports_them() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    m.write("etl.yaml", "local edit\n");

    let result = m.coordinator.pull(&token()).expect("pull");
    assert_eq!(result.modified, vec![id("etl")]);
    assert_eq!(result.message, "Already up to date");
    assert_eq!(m.read("etl.yaml").as_deref(), Some("local edit\n"));

    // already known to be modified: nothing new to report
    let again = m.coordinator.pull(&token()).expect("pull again");
    assert!(again.success);
    assert!(again.modified.is_empty());
    assert!(again.conflicts.is_empty());
    assert_eq!(m.read("etl.yaml").as_deref(), Some("local edit\n"));
    assert_eq!(m.status_of("etl"), SyncStatus::Modified);
}

#[test]
fn pull_applies_remote_deletion_of_unchanged_item() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    m.remote
        .push_commit(
            "main",
            &[FileChange::Delete {
                path: "dags/etl.yaml".to_string(),
            }],
            "drop etl",
            "bob",
        )
        .expect("remote delete");

    let result = m.coordinator.pull(&token()).expect("pull");
    assert_eq!(result.synced, vec![id("etl")]);
    assert!(m.read("etl.yaml").is_none());
    assert!(m.coordinator.ledger().get(&id("etl")).is_none());
}

#[test]
fn failed_fetch_is_recorded_until_next_successful_pull() {
    let m = machine();
    m.remote.set_offline(Some(TransportError::Network {
        operation: "fetch",
        message: "connection refused".to_string(),
    }));

    let err = m.coordinator.pull(&token()).unwrap_err();
    assert!(
        matches!(err, SyncError::Transport(TransportError::Network { .. })),
        "got: {err}"
    );
    let status = m.coordinator.status().expect("status");
    assert_eq!(status.summary, SummaryStatus::Error);
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("connection refused")));

    m.remote.set_offline(None);
    m.coordinator.pull(&token()).expect("pull");
    let status = m.coordinator.status().expect("status");
    assert_eq!(status.summary, SummaryStatus::Synced);
    assert!(status.last_error.is_none());
}

#[test]
fn untracked_local_item_differing_from_remote_is_not_overwritten() {
    let m = machine();
    m.remote
        .push_commit("main", &[upsert("dags/etl.yaml", "theirs\n")], "seed", "bob")
        .expect("seed");
    m.write("etl.yaml", "mine\n");

    m.coordinator.pull(&token()).expect("pull");
    assert_eq!(m.read("etl.yaml").as_deref(), Some("mine\n"));
    assert_eq!(m.status_of("etl"), SyncStatus::Untracked);
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[test]
fn publish_commits_with_default_message() {
    let m = machine();
    m.write("memory/team/notes.md", "# notes\n");

    let result = m
        .coordinator
        .publish(&token(), "memory/team/notes", None, false)
        .expect("publish");
    assert_eq!(result.message, "Published memory/team/notes");
    assert_eq!(
        m.remote_file("dags/memory/team/notes.md").as_deref(),
        Some("# notes\n")
    );

    let item = m.coordinator.item_status("memory/team/notes").expect("status");
    assert_eq!(item.status, SyncStatus::Synced);
    assert_eq!(item.previous_status, Some(SyncStatus::Untracked));
    assert_eq!(item.base_commit, m.remote.head("main"));
}

#[test]
fn publish_of_synced_item_has_no_changes() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    let err = m
        .coordinator
        .publish(&token(), "etl", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::NoChanges { .. }), "got: {err}");
}

#[test]
fn publish_of_unknown_or_invalid_item() {
    let m = machine();
    let err = m
        .coordinator
        .publish(&token(), "ghost", None, false)
        .unwrap_err();
    assert!(err.is_dag_not_found(), "got: {err}");

    let err = m
        .coordinator
        .publish(&token(), "../escape", None, false)
        .unwrap_err();
    assert!(err.is_invalid_dag_id(), "got: {err}");
}

#[test]
fn conflict_round_trip_with_force() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    let c1 = m
        .remote
        .push_commit("main", &[upsert("dags/etl.yaml", "bob's\n")], "bob edit", "bob")
        .expect("remote edit");
    m.write("etl.yaml", "mine\n");

    let pulled = m.coordinator.pull(&token()).expect("pull");
    assert_eq!(pulled.conflicts, vec![id("etl")]);
    assert_eq!(pulled.message, "Pulled with 1 conflict(s)");
    assert_eq!(m.read("etl.yaml").as_deref(), Some("mine\n"));

    let repeated = m.coordinator.pull(&token()).expect("pull again");
    assert!(repeated.conflicts.is_empty());
    assert_eq!(repeated.message, "Already up to date");

    let item = m.coordinator.item_status("etl").expect("status");
    assert_eq!(item.status, SyncStatus::Conflict);
    assert_eq!(item.remote_commit.as_deref(), Some(c1.as_str()));
    assert_eq!(item.remote_author.as_deref(), Some("bob"));
    assert_eq!(item.remote_message.as_deref(), Some("bob edit"));
    assert!(item.conflict_detected_at.is_some());

    let err = m
        .coordinator
        .publish(&token(), "etl", None, false)
        .unwrap_err();
    assert!(err.is_conflict(), "got: {err}");
    assert_eq!(m.remote.head("main").as_deref(), Some(c1.as_str()));

    m.coordinator
        .publish(&token(), "etl", Some("keep mine"), true)
        .expect("forced publish");
    let c2 = m.remote.head("main").expect("head");
    assert_ne!(c2, c1);
    assert_eq!(m.remote_file("dags/etl.yaml").as_deref(), Some("mine\n"));

    let item = m.coordinator.item_status("etl").expect("status");
    assert_eq!(item.status, SyncStatus::Synced);
    assert_eq!(item.base_commit.as_deref(), Some(c2.as_str()));
    assert!(item.conflict_detected_at.is_none());
}

#[test]
fn cancelled_publish_leaves_everything_untouched() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = m
        .coordinator
        .publish(&cancel, "etl", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled), "got: {err}");
    assert_eq!(m.remote.push_count(), 0);
    assert!(m.remote.head("main").is_none());
    assert!(m.coordinator.ledger().get(&id("etl")).is_none());
}

#[test]
fn publish_all_defaults_to_pending_items_in_one_commit() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    m.write("etl.yaml", "v2\n");
    m.write("souls/reviewer.md", "be kind\n");
    m.write("skills/sql.md", "# sql\n");
    let pushes = m.remote.push_count();

    let result = m
        .coordinator
        .publish_all(&token(), None, None)
        .expect("publish all");
    assert!(result.success);
    assert_eq!(
        result.synced,
        vec![id("etl"), id("skills/sql"), id("souls/reviewer")]
    );
    assert_eq!(result.message, "Published 3 DAG(s)");
    assert_eq!(m.remote.push_count(), pushes + 1);

    let err = m
        .coordinator
        .publish_all(&token(), None, None)
        .unwrap_err();
    assert!(matches!(err, SyncError::NoChanges { item_id: None }), "got: {err}");
}

#[test]
fn publish_all_records_per_item_failures() {
    let m = machine();
    m.write("a.yaml", "a\n");
    m.write("b.yaml", "b\n");
    let ids = vec!["a".to_string(), "b".to_string(), "ghost".to_string()];

    let result = m
        .coordinator
        .publish_all(&token(), Some("batch"), Some(&ids))
        .expect("publish all");
    assert!(!result.success);
    assert_eq!(result.synced, vec![id("a"), id("b")]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].item_id, "ghost");
    assert_eq!(m.remote_file("dags/a.yaml").as_deref(), Some("a\n"));
}

#[test]
fn publish_all_push_failure_is_reported_per_item() {
    let m = machine();
    m.write("a.yaml", "a\n");
    m.write("b.yaml", "b\n");
    m.remote.reject_next_push(TransportError::Rejected {
        message: "protected branch".to_string(),
    });

    let result = m
        .coordinator
        .publish_all(&token(), None, None)
        .expect("publish all");
    assert!(!result.success);
    assert!(result.synced.is_empty());
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].message.contains("protected branch"));
    assert!(m.coordinator.ledger().list().is_empty());
}

// ---------------------------------------------------------------------------
// Discard / forget / cleanup
// ---------------------------------------------------------------------------

#[test]
fn discard_reverts_to_last_synced_content() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    let synced_hash = m
        .coordinator
        .item_status("etl")
        .expect("status")
        .last_synced_hash;
    m.write("etl.yaml", "scratch\n");
    assert_eq!(m.status_of("etl"), SyncStatus::Modified);

    m.coordinator.discard(&token(), "etl").expect("discard");
    assert_eq!(m.read("etl.yaml").as_deref(), Some("v1\n"));
    let item = m.coordinator.item_status("etl").expect("status");
    assert_eq!(item.status, SyncStatus::Synced);
    assert_eq!(item.local_hash, synced_hash);
}

#[test]
fn discard_of_unpublished_item_removes_it() {
    let m = machine();
    m.write("draft.yaml", "wip\n");
    m.coordinator.discard(&token(), "draft").expect("discard");
    assert!(m.read("draft.yaml").is_none());

    let err = m.coordinator.discard(&token(), "draft").unwrap_err();
    assert!(err.is_dag_not_found(), "got: {err}");
}

#[test]
fn untracked_synced_missing_cleanup_cycle() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    assert_eq!(m.status_of("etl"), SyncStatus::Untracked);

    m.publish("etl");
    assert_eq!(m.status_of("etl"), SyncStatus::Synced);

    fs::remove_file(m.path("etl.yaml")).expect("rm");
    let item = m.coordinator.item_status("etl").expect("status");
    assert_eq!(item.status, SyncStatus::Missing);
    assert!(item.missing_at.is_some());
    assert!(item.local_hash.is_none());
    assert_eq!(m.coordinator.status().expect("status").counts.missing, 1);

    let cleaned = m.coordinator.cleanup(&token()).expect("cleanup");
    assert_eq!(cleaned, vec![id("etl")]);
    assert!(m.coordinator.ledger().list().is_empty());
    assert!(m.coordinator.item_status("etl").unwrap_err().is_dag_not_found());
    // the remote copy is untouched
    assert_eq!(m.remote_file("dags/etl.yaml").as_deref(), Some("v1\n"));
}

#[test]
fn forget_refuses_unpublished_changes() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.write("other.yaml", "o\n");
    m.publish("etl");
    m.publish("other");
    m.write("etl.yaml", "edited\n");

    let err = m
        .coordinator
        .forget(&token(), &["other".to_string(), "etl".to_string()])
        .unwrap_err();
    assert!(
        matches!(err, SyncError::CannotForget { status: SyncStatus::Modified, .. }),
        "got: {err}"
    );
    // nothing removed when one id is ineligible
    assert_eq!(m.coordinator.ledger().list().len(), 2);

    let forgotten = m
        .coordinator
        .forget(&token(), &["other".to_string()])
        .expect("forget");
    assert_eq!(forgotten, vec![id("other")]);
    assert!(m.read("other.yaml").is_some());

    let err = m
        .coordinator
        .forget(&token(), &["ghost".to_string()])
        .unwrap_err();
    assert!(err.is_dag_not_found(), "got: {err}");
}

// ---------------------------------------------------------------------------
// Delete / move
// ---------------------------------------------------------------------------

#[test]
fn delete_removes_remote_local_and_ledger() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");

    m.coordinator
        .delete(&token(), "etl", None, false)
        .expect("delete");
    assert!(m.remote_file("dags/etl.yaml").is_none());
    assert!(m.read("etl.yaml").is_none());
    assert!(m.coordinator.ledger().get(&id("etl")).is_none());
}

#[test]
fn delete_guards() {
    let m = machine();
    m.write("draft.yaml", "wip\n");
    let err = m
        .coordinator
        .delete(&token(), "draft", None, false)
        .unwrap_err();
    assert!(
        matches!(err, SyncError::CannotDeleteUntracked { .. }),
        "got: {err}"
    );

    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    m.write("etl.yaml", "edited\n");
    let err = m
        .coordinator
        .delete(&token(), "etl", None, false)
        .unwrap_err();
    match err {
        SyncError::Validation(v) => assert_eq!(v.field, "force"),
        other => panic!("expected validation error, got {other}"),
    }

    m.coordinator
        .delete(&token(), "etl", None, true)
        .expect("forced delete");
    assert!(m.remote_file("dags/etl.yaml").is_none());
}

#[test]
fn delete_all_missing_uses_one_commit() {
    let m = machine();
    for name in ["a", "b", "keep"] {
        m.write(&format!("{name}.yaml"), name);
        m.publish(name);
    }
    fs::remove_file(m.path("a.yaml")).expect("rm");
    fs::remove_file(m.path("b.yaml")).expect("rm");
    let pushes = m.remote.push_count();

    let deleted = m
        .coordinator
        .delete_all_missing(&token(), None)
        .expect("delete missing");
    assert_eq!(deleted, vec![id("a"), id("b")]);
    assert_eq!(m.remote.push_count(), pushes + 1);
    assert!(m.remote_file("dags/a.yaml").is_none());
    assert!(m.remote_file("dags/b.yaml").is_none());
    assert_eq!(m.remote_file("dags/keep.yaml").as_deref(), Some("keep"));
    assert_eq!(m.coordinator.ledger().list().len(), 1);
}

#[test]
fn move_keeps_hash_with_fresh_base() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    let before = m.coordinator.item_status("etl").expect("status");

    m.coordinator
        .move_item(&token(), "etl", "etl_daily", None, false)
        .expect("move");

    assert!(m.read("etl.yaml").is_none());
    assert_eq!(m.read("etl_daily.yaml").as_deref(), Some("v1\n"));
    assert!(m.remote_file("dags/etl.yaml").is_none());
    assert_eq!(m.remote_file("dags/etl_daily.yaml").as_deref(), Some("v1\n"));

    let after = m.coordinator.item_status("etl_daily").expect("status");
    assert_eq!(after.last_synced_hash, before.last_synced_hash);
    assert_ne!(after.base_commit, before.base_commit);
    assert_eq!(after.status, SyncStatus::Synced);
    assert!(m.coordinator.ledger().get(&id("etl")).is_none());
}

#[test]
fn move_after_local_rename() {
    let m = machine();
    m.write("skills/sql.md", "# sql\n");
    m.publish("skills/sql");
    fs::create_dir_all(m.path("skills/db")).expect("mkdir");
    fs::rename(m.path("skills/sql.md"), m.path("skills/db/sql.md")).expect("rename");

    m.coordinator
        .move_item(&token(), "skills/sql", "skills/db/sql", Some("reorganise"), false)
        .expect("retroactive move");
    assert_eq!(m.remote_file("dags/skills/db/sql.md").as_deref(), Some("# sql\n"));
    assert!(m.remote_file("dags/skills/sql.md").is_none());
    assert_eq!(m.status_of("skills/db/sql"), SyncStatus::Synced);
}

#[test]
fn move_rejects_kind_change_and_taken_destination() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.write("other.yaml", "o\n");
    m.publish("etl");

    let err = m
        .coordinator
        .move_item(&token(), "etl", "skills/etl", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)), "got: {err}");

    let err = m
        .coordinator
        .move_item(&token(), "etl", "other", None, false)
        .unwrap_err();
    match err {
        SyncError::Validation(v) => assert!(v.message.contains("already exists"), "{v}"),
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn move_is_conflict_checked_against_the_source() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    let theirs = m
        .remote
        .push_commit("main", &[upsert("dags/etl.yaml", "bob's\n")], "bob edit", "bob")
        .expect("remote edit");
    m.write("etl.yaml", "mine\n");

    let err = m
        .coordinator
        .move_item(&token(), "etl", "etl_daily", None, false)
        .unwrap_err();
    assert!(err.is_conflict(), "got: {err}");
    assert_eq!(m.remote.head("main").as_deref(), Some(theirs.as_str()));
    assert_eq!(m.read("etl.yaml").as_deref(), Some("mine\n"));
    assert!(m.read("etl_daily.yaml").is_none());
    assert!(m.coordinator.ledger().get(&id("etl")).is_some());
    assert!(m.coordinator.ledger().get(&id("etl_daily")).is_none());

    m.coordinator
        .move_item(&token(), "etl", "etl_daily", None, true)
        .expect("forced move");
    assert!(m.remote_file("dags/etl.yaml").is_none());
    assert_eq!(m.remote_file("dags/etl_daily.yaml").as_deref(), Some("mine\n"));
    assert_eq!(m.read("etl_daily.yaml").as_deref(), Some("mine\n"));
    assert_eq!(m.status_of("etl_daily"), SyncStatus::Synced);
}

#[test]
fn cancelled_delete_and_move_leave_everything_untouched() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.write("other.yaml", "o\n");
    m.publish("etl");
    m.publish("other");
    let head = m.remote.head("main");
    let pushes = m.remote.push_count();
    let ledger_before = m.coordinator.ledger().snapshot().items.clone();

    let cancelled = token();
    cancelled.cancel();
    let err = m
        .coordinator
        .delete(&cancelled, "etl", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled), "got: {err}");
    let err = m
        .coordinator
        .move_item(&cancelled, "other", "renamed", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled), "got: {err}");

    assert_eq!(m.remote.head("main"), head);
    assert_eq!(m.remote.push_count(), pushes);
    assert_eq!(m.read("etl.yaml").as_deref(), Some("v1\n"));
    assert_eq!(m.read("other.yaml").as_deref(), Some("o\n"));
    assert!(m.read("renamed.yaml").is_none());
    assert_eq!(m.coordinator.ledger().snapshot().items, ledger_before);
}

#[test]
fn delete_records_remote_removal_when_local_delete_fails() {
    let (m, store) = flaky_machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    store.fail_writes();

    let err = m
        .coordinator
        .delete(&token(), "etl", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Io { .. }), "got: {err}");

    assert!(m.remote_file("dags/etl.yaml").is_none());
    let state = m.coordinator.ledger().snapshot();
    assert!(state.items.get(&id("etl")).is_none());
    assert_eq!(state.remote_head, m.remote.head("main"));
    assert_eq!(state.last_sync_commit, m.remote.head("main"));
    assert_eq!(m.read("etl.yaml").as_deref(), Some("v1\n"));
}

#[test]
fn move_records_remote_rename_when_local_rename_fails() {
    let (m, store) = flaky_machine();
    m.write("etl.yaml", "v1\n");
    m.publish("etl");
    store.fail_writes();

    let err = m
        .coordinator
        .move_item(&token(), "etl", "etl_daily", None, false)
        .unwrap_err();
    assert!(matches!(err, SyncError::Io { .. }), "got: {err}");

    assert_eq!(m.remote_file("dags/etl_daily.yaml").as_deref(), Some("v1\n"));
    let state = m.coordinator.ledger().snapshot();
    assert!(state.items.get(&id("etl")).is_none());
    let moved = state.items.get(&id("etl_daily")).expect("re-keyed entry");
    assert_eq!(moved.base_commit, m.remote.head("main"));
    assert_eq!(state.remote_head, m.remote.head("main"));
}

// ---------------------------------------------------------------------------
// Gates, views, config
// ---------------------------------------------------------------------------

#[test]
fn disabled_sync_rejects_operations() {
    let m = machine_on(MemoryTransport::new(), SyncConfig::default());
    let err = m.coordinator.pull(&token()).unwrap_err();
    assert!(matches!(err, SyncError::NotEnabled), "got: {err}");
    let status = m.coordinator.status().expect("status");
    assert!(!status.enabled);
    assert!(!m.coordinator.test_connection().success);

    m.write("etl.yaml", "v1\n");
    let err = m.coordinator.item_status("etl").unwrap_err();
    assert!(matches!(err, SyncError::NotEnabled), "got: {err}");
    let err = m.coordinator.item_diff("etl").unwrap_err();
    assert!(matches!(err, SyncError::NotEnabled), "got: {err}");
}

#[test]
fn push_disabled_gates_only_remote_writes() {
    let m = machine();
    m.write("etl.yaml", "v1\n");
    m.write("other.yaml", "o\n");
    m.publish("etl");
    m.publish("other");
    m.write("etl.yaml", "edited\n");

    let mut config = m.config.clone();
    config.push_enabled = false;
    m.coordinator.update_config(config).expect("update config");

    let push_disabled = |result: Result<(), SyncError>| {
        assert!(matches!(result, Err(SyncError::PushDisabled)), "got: {result:?}");
    };
    push_disabled(m.coordinator.publish(&token(), "etl", None, false).map(|_| ()));
    push_disabled(m.coordinator.publish_all(&token(), None, None).map(|_| ()));
    push_disabled(m.coordinator.delete(&token(), "other", None, false));
    push_disabled(m.coordinator.delete_all_missing(&token(), None).map(|_| ()));
    push_disabled(m.coordinator.move_item(&token(), "other", "renamed", None, false));

    m.coordinator.pull(&token()).expect("pull");
    m.coordinator.status().expect("status");
    m.coordinator.discard(&token(), "etl").expect("discard");
    m.coordinator
        .forget(&token(), &["other".to_string()])
        .expect("forget");
}

#[test]
fn item_diff_shows_local_against_remote() {
    let m = machine();
    m.write("etl.yaml", "name: etl\nsteps: []\n");
    m.publish("etl");
    m.write("etl.yaml", "name: etl\nsteps: [load]\n");

    let diff = m.coordinator.item_diff("etl").expect("diff");
    assert_eq!(diff.file_path, "dags/etl.yaml");
    assert_eq!(diff.status, Some(SyncStatus::Modified));
    assert_eq!(diff.remote_content, "name: etl\nsteps: []\n");
    assert!(diff.unified_diff.contains("--- a/dags/etl.yaml"));
    assert!(diff.unified_diff.contains("+steps: [load]"));
    assert_eq!(diff.remote_message.as_deref(), Some("Update etl"));

    m.write("draft.yaml", "wip\n");
    assert!(m.coordinator.item_diff("draft").unwrap_err().is_dag_not_found());
}

#[test]
fn update_config_validates_and_redacts() {
    let m = machine();
    let mut bad = m.config.clone();
    bad.repository = String::new();
    let err = m.coordinator.update_config(bad).unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)), "got: {err}");
    assert_eq!(m.coordinator.config().repository, "github.com/acme/dags");

    let mut with_token = m.config.clone();
    with_token.auth.kind = dagsync_core::AuthType::Token;
    with_token.auth.token = Some("s3cret".to_string());
    m.coordinator.update_config(with_token).expect("token config");

    // a redacted round-trip keeps the stored token
    let mut round_trip = m.config.clone();
    round_trip.auth.kind = dagsync_core::AuthType::Token;
    round_trip.branch = "release".to_string();
    m.coordinator.update_config(round_trip).expect("round trip");

    let view = m.coordinator.config();
    assert!(view.auth.token_configured);
    assert_eq!(view.branch, "release");
    let rendered = serde_json::to_string(&view).expect("json");
    assert!(!rendered.contains("s3cret"));
}

#[test]
fn test_connection_reports_failures_as_data() {
    let m = machine();
    assert!(m.coordinator.test_connection().success);

    m.remote.set_offline(Some(TransportError::Auth {
        operation: "connect",
        message: "bad token".to_string(),
    }));
    let result = m.coordinator.test_connection();
    assert!(!result.success);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("bad token")));
}

// ---------------------------------------------------------------------------
// Multiple writers
// ---------------------------------------------------------------------------

#[test]
fn second_machine_sees_published_items() {
    let alice = machine();
    let bob = machine_on(alice.remote.clone(), enabled_config());

    alice.write("etl.yaml", "v1\n");
    alice.publish("etl");
    bob.coordinator.pull(&token()).expect("pull");
    assert_eq!(bob.read("etl.yaml").as_deref(), Some("v1\n"));

    bob.write("etl.yaml", "bob v2\n");
    bob.publish("etl");
    alice.coordinator.pull(&token()).expect("pull");
    assert_eq!(alice.read("etl.yaml").as_deref(), Some("bob v2\n"));
    assert_eq!(alice.status_of("etl"), SyncStatus::Synced);
}

#[test]
fn concurrent_publishes_are_serialized() {
    let m = machine();
    let names = ["a", "b", "c", "d"];
    for name in names {
        m.write(&format!("{name}.yaml"), name);
    }

    std::thread::scope(|scope| {
        for name in names {
            let coordinator = &m.coordinator;
            scope.spawn(move || {
                coordinator
                    .publish(&CancellationToken::new(), name, None, false)
                    .expect("publish");
            });
        }
        scope.spawn(|| {
            m.coordinator.status().expect("status while publishing");
        });
    });

    for name in names {
        assert_eq!(
            m.remote_file(&format!("dags/{name}.yaml")).as_deref(),
            Some(name)
        );
    }
    assert_eq!(m.coordinator.status().expect("status").counts.synced, 4);
}
