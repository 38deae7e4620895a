// Binary smoke tests that need neither GitHub nor a dispatcher

use assert_cmd::Command;
use predicates::prelude::*;

fn labelflow(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("labelflow").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env("RUST_LOG", "error");
    cmd
}

#[test]
fn no_subcommand_explains_how_to_start() {
    let dir = tempfile::tempdir().unwrap();
    labelflow(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("labelflow register"))
        .stdout(predicate::str::contains("labelflow pickup"))
        .stdout(predicate::str::contains("labelflow heartbeat"));
}

#[test]
fn labels_dry_run_lists_the_default_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    labelflow(&dir)
        .args(["labels", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("To Do"))
        .stdout(predicate::str::contains("Testing"))
        .stdout(predicate::str::contains("To Improve"));
}

#[test]
fn register_then_status_shows_the_project() {
    let dir = tempfile::tempdir().unwrap();
    labelflow(&dir)
        .args(["register", "shop", "--name", "Webshop", "--repo", "/src/shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered Webshop"));

    assert!(dir.path().join(".labelflow/projects.json").exists());

    labelflow(&dir)
        .args(["--json", "status", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Webshop\""))
        .stdout(predicate::str::contains("\"roleExecution\": \"parallel\""));
}

#[test]
fn status_for_unknown_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    labelflow(&dir)
        .args(["status", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));
}

#[test]
fn complete_with_illegal_result_fails() {
    let dir = tempfile::tempdir().unwrap();
    labelflow(&dir)
        .args(["register", "shop", "--repo", "/src/shop"])
        .assert()
        .success();

    labelflow(&dir)
        .args(["complete", "shop", "developer", "pass"])
        .assert()
        .failure();
}

#[test]
fn register_records_the_tracker_binding() {
    let dir = tempfile::tempdir().unwrap();
    labelflow(&dir)
        .args(["register", "shop", "--repo", "/src/shop", "--tracker", "acme/shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acme/shop"));

    labelflow(&dir)
        .args(["--json", "status", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tracker\": \"acme/shop\""));

    labelflow(&dir)
        .args(["register", "blog", "--repo", "/src/blog", "--tracker", "not-a-repo"])
        .assert()
        .failure();
}
