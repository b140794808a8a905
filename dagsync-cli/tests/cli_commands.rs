use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;

use git2::Repository;
use tempfile::TempDir;

fn dagsync(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dagsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("DAGSYNC_ITEMS_DIR")
        .env_remove("DAGSYNC_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn bare_remote(dir: &Path) -> PathBuf {
    let remote = dir.join("remote.git");
    Repository::init_bare(&remote).expect("init bare remote");
    remote
}

fn configure(home: &Path, remote: &Path) {
    dagsync(home)
        .args(["config", "set", "--enabled", "true", "--path", "dags"])
        .arg("--repository")
        .arg(remote)
        .assert()
        .success();
}

fn write_item(home: &Path, rel: &str, content: &str) {
    let path = home.join(".dagsync/items").join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write item");
}

fn status_json(home: &Path) -> serde_json::Value {
    let output = dagsync(home)
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(
        output.status.success(),
        "status failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("status JSON")
}

fn remote_has(remote: &Path, path: &str) -> bool {
    let repo = Repository::open_bare(remote).expect("open remote");
    let Ok(head) = repo.refname_to_id("refs/heads/main") else {
        return false;
    };
    let tree = repo
        .find_commit(head)
        .and_then(|commit| commit.tree())
        .expect("head tree");
    tree.get_path(Path::new(path)).is_ok()
}

/// Two homes sharing one bare remote, with `etl` published from the first.
struct Pair {
    _tmp: TempDir,
    remote: PathBuf,
    alice: PathBuf,
    bob: PathBuf,
}

fn published_pair() -> Pair {
    let tmp = TempDir::new().expect("tmp");
    let remote = bare_remote(tmp.path());
    let alice = tmp.path().join("alice");
    let bob = tmp.path().join("bob");
    configure(&alice, &remote);
    configure(&bob, &remote);

    write_item(&alice, "etl.yaml", "steps: [extract]\n");
    dagsync(&alice)
        .args(["publish", "etl", "-m", "add etl"])
        .assert()
        .success()
        .stdout(contains("Published etl"));

    Pair {
        _tmp: tmp,
        remote,
        alice,
        bob,
    }
}

#[test]
fn publish_all_then_pull_on_another_home() {
    let tmp = TempDir::new().expect("tmp");
    let remote = bare_remote(tmp.path());
    let alice = tmp.path().join("alice");
    let bob = tmp.path().join("bob");
    configure(&alice, &remote);
    configure(&bob, &remote);

    write_item(&alice, "etl.yaml", "steps: []\n");
    write_item(&alice, "skills/review.md", "# review\n");

    let status = status_json(&alice);
    assert_eq!(status["items"]["etl"]["status"], "untracked");
    assert_eq!(status["items"]["skills/review"]["kind"], "skill");
    assert_eq!(status["summary"], "pending");

    dagsync(&alice)
        .args(["publish", "--all", "-m", "initial import"])
        .assert()
        .success()
        .stdout(contains("Published 2 DAG(s)"));
    assert!(remote_has(&remote, "dags/skills/review.md"));

    dagsync(&bob)
        .arg("pull")
        .assert()
        .success()
        .stdout(contains("Synced 2 DAG(s)"))
        .stdout(contains("skills/review"));
    assert_eq!(
        fs::read_to_string(bob.join(".dagsync/items/etl.yaml")).expect("pulled"),
        "steps: []\n"
    );

    dagsync(&bob)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("SYNCED"))
        .stdout(contains("2 synced"));

    dagsync(&bob)
        .arg("pull")
        .assert()
        .success()
        .stdout(contains("Already up to date"));
}

#[test]
fn diff_shows_local_edit_against_remote() {
    let pair = published_pair();
    write_item(&pair.alice, "etl.yaml", "steps: [extract, load]\n");

    dagsync(&pair.alice)
        .args(["diff", "etl"])
        .assert()
        .success()
        .stdout(contains("--- a/dags/etl.yaml"))
        .stdout(contains("+steps: [extract, load]"))
        .stdout(contains("-steps: [extract]"));

    write_item(&pair.alice, "etl.yaml", "steps: [extract]\n");
    dagsync(&pair.alice)
        .args(["diff", "etl"])
        .assert()
        .success()
        .stdout(contains("No differences for 'etl'."));
}

#[test]
fn conflicting_publish_fails_until_forced() {
    let pair = published_pair();
    dagsync(&pair.bob).arg("pull").assert().success();

    write_item(&pair.bob, "etl.yaml", "steps: [bob]\n");
    dagsync(&pair.bob).args(["publish", "etl"]).assert().success();
    write_item(&pair.alice, "etl.yaml", "steps: [alice]\n");

    dagsync(&pair.alice)
        .args(["publish", "etl"])
        .assert()
        .failure()
        .stderr(contains("changed remotely"));

    dagsync(&pair.alice)
        .args(["publish", "etl", "--force"])
        .assert()
        .success()
        .stdout(contains("Published etl"));

    dagsync(&pair.bob)
        .arg("pull")
        .assert()
        .success()
        .stdout(contains("etl"));
    assert_eq!(
        fs::read_to_string(pair.bob.join(".dagsync/items/etl.yaml")).expect("pulled"),
        "steps: [alice]\n"
    );
}

#[test]
fn discard_restores_the_published_copy() {
    let pair = published_pair();
    write_item(&pair.alice, "etl.yaml", "steps: [oops]\n");

    dagsync(&pair.alice)
        .args(["discard", "etl"])
        .assert()
        .success()
        .stdout(contains("discarded local changes to 'etl'"));
    assert_eq!(
        fs::read_to_string(pair.alice.join(".dagsync/items/etl.yaml")).expect("restored"),
        "steps: [extract]\n"
    );
    assert_eq!(status_json(&pair.alice)["items"]["etl"]["status"], "synced");
}

#[test]
fn cleanup_dry_run_lists_missing_items_without_forgetting() {
    let pair = published_pair();
    fs::remove_file(pair.alice.join(".dagsync/items/etl.yaml")).expect("remove");

    dagsync(&pair.alice)
        .args(["cleanup", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would forget 1 item(s)"))
        .stdout(contains("etl"));
    assert_eq!(status_json(&pair.alice)["items"]["etl"]["status"], "missing");

    dagsync(&pair.alice)
        .arg("cleanup")
        .assert()
        .success()
        .stdout(contains("forgot 1 item(s)"));
    assert!(status_json(&pair.alice)["items"].get("etl").is_none());
    assert!(remote_has(&pair.remote, "dags/etl.yaml"), "cleanup never touches the remote");
}

#[test]
fn forget_rejects_unknown_items() {
    let pair = published_pair();
    dagsync(&pair.alice)
        .args(["forget", "nope"])
        .assert()
        .failure()
        .stderr(contains("item not found: nope"));
}

#[test]
fn move_then_delete_reach_the_remote() {
    let pair = published_pair();

    dagsync(&pair.alice)
        .args(["mv", "etl", "pipeline", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would move 'etl' to 'pipeline'"))
        .stdout(contains("dags/pipeline.yaml"));
    assert!(remote_has(&pair.remote, "dags/etl.yaml"));

    dagsync(&pair.alice)
        .args(["mv", "etl", "skills/etl"])
        .assert()
        .failure();

    dagsync(&pair.alice)
        .args(["mv", "etl", "pipeline"])
        .assert()
        .success()
        .stdout(contains("moved 'etl' to 'pipeline'"));
    assert!(!remote_has(&pair.remote, "dags/etl.yaml"));
    assert!(remote_has(&pair.remote, "dags/pipeline.yaml"));

    dagsync(&pair.alice)
        .args(["delete", "pipeline", "-m", "retire pipeline"])
        .assert()
        .success();
    assert!(!remote_has(&pair.remote, "dags/pipeline.yaml"));
    assert!(!pair.alice.join(".dagsync/items/pipeline.yaml").exists());
}

#[test]
fn delete_all_missing_removes_them_in_one_go() {
    let pair = published_pair();
    write_item(&pair.alice, "memory/notes.md", "remember\n");
    dagsync(&pair.alice)
        .args(["publish", "memory/notes"])
        .assert()
        .success();
    fs::remove_file(pair.alice.join(".dagsync/items/etl.yaml")).expect("remove");
    fs::remove_file(pair.alice.join(".dagsync/items/memory/notes.md")).expect("remove");

    dagsync(&pair.alice)
        .args(["delete", "--all-missing", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would delete 2 item(s)"));
    assert!(remote_has(&pair.remote, "dags/etl.yaml"));

    dagsync(&pair.alice)
        .args(["delete", "--all-missing"])
        .assert()
        .success()
        .stdout(contains("deleted 2 item(s)"));
    assert!(!remote_has(&pair.remote, "dags/etl.yaml"));
    assert!(!remote_has(&pair.remote, "dags/memory/notes.md"));
}

#[test]
fn items_dir_can_be_overridden_from_the_environment() {
    let tmp = TempDir::new().expect("tmp");
    let remote = bare_remote(tmp.path());
    let home = tmp.path().join("home");
    let items = tmp.path().join("elsewhere");
    configure(&home, &remote);
    fs::create_dir_all(&items).expect("mkdir");
    fs::write(items.join("nightly.yaml"), "steps: []\n").expect("write");

    let output = dagsync(&home)
        .env("DAGSYNC_ITEMS_DIR", &items)
        .args(["status", "--json"])
        .output()
        .expect("status");
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(status["items"]["nightly"]["status"], "untracked");

    dagsync(&home)
        .arg("--items-dir")
        .arg(&items)
        .args(["publish", "nightly"])
        .assert()
        .success();
    assert!(remote_has(&remote, "dags/nightly.yaml"));
}

#[test]
fn disabled_sync_is_reported() {
    let home = TempDir::new().expect("home");

    dagsync(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Git sync is not enabled."));

    dagsync(home.path())
        .arg("pull")
        .assert()
        .failure()
        .stderr(contains("git sync is not enabled"));

    dagsync(home.path())
        .arg("test-connection")
        .assert()
        .failure()
        .stdout(contains("Git sync is not enabled"));

    dagsync(home.path())
        .args(["diff", "etl"])
        .assert()
        .failure()
        .stderr(contains("git sync is not enabled"));
}

#[test]
fn config_set_validates_and_show_redacts_secrets() {
    let tmp = TempDir::new().expect("tmp");
    let remote = bare_remote(tmp.path());
    let home = tmp.path().join("home");

    dagsync(&home)
        .args(["config", "set", "--enabled", "true"])
        .assert()
        .failure()
        .stderr(contains("repository"));

    configure(&home, &remote);
    dagsync(&home)
        .args(["config", "set", "--auth-type", "token", "--token", "s3cr3t-token"])
        .assert()
        .success();

    dagsync(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("\"token_configured\": true"))
        .stdout(contains("s3cr3t-token").not());

    dagsync(&home)
        .args(["config", "set", "--auth-type", "kerberos"])
        .assert()
        .failure()
        .stderr(contains("unknown auth type 'kerberos'"));
}

#[test]
fn test_connection_reports_unreachable_remote() {
    let tmp = TempDir::new().expect("tmp");
    let home = tmp.path().join("home");
    configure(&home, &tmp.path().join("missing.git"));

    dagsync(&home)
        .arg("test-connection")
        .assert()
        .failure()
        .stdout(contains("Connection failed"));

    let remote = bare_remote(tmp.path());
    configure(&home, &remote);
    dagsync(&home)
        .arg("test-connection")
        .assert()
        .success()
        .stdout(contains("Connection successful"));
}
