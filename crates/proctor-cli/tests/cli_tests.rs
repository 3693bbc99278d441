//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn proctor() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("proctor").unwrap()
}

const VALID_TOPICS: &str = r#"
[banks]
lecturette = ["A", "B", "C", "D"]
group-discussion = ["E", "F", "G", "H"]
"#;

const SHORT_TOPICS: &str = r#"
[banks]
lecturette = ["only one topic"]
"#;

#[test]
fn list_kinds_shows_all_variants() {
    proctor()
        .arg("list-kinds")
        .assert()
        .success()
        .stdout(predicate::str::contains("lecturette"))
        .stdout(predicate::str::contains("Group Discussion"))
        .stdout(predicate::str::contains("group-planning"))
        .stdout(predicate::str::contains("3:00"));
}

#[test]
fn validate_valid_topics() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("topics.toml");
    std::fs::write(&path, VALID_TOPICS).unwrap();

    proctor()
        .arg("validate")
        .arg("--topics")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Lecturette: 4 topics"))
        .stdout(predicate::str::contains("All topic banks valid"));
}

#[test]
fn validate_rejects_short_bank() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("topics.toml");
    std::fs::write(&path, SHORT_TOPICS).unwrap();

    proctor()
        .arg("validate")
        .arg("--topics")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("problem: Lecturette"));
}

#[test]
fn validate_nonexistent_file() {
    proctor()
        .arg("validate")
        .arg("--topics")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    proctor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created proctor.toml"))
        .stdout(predicate::str::contains("Created topics.toml"));

    assert!(dir.path().join("proctor.toml").exists());
    assert!(dir.path().join("topics.toml").exists());
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    proctor().current_dir(dir.path()).arg("init").assert().success();
    proctor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists, skipping"));
}

#[test]
fn init_topics_pass_validation() {
    let dir = TempDir::new().unwrap();
    proctor().current_dir(dir.path()).arg("init").assert().success();

    proctor()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--topics")
        .arg("topics.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All topic banks valid"));
}

#[test]
fn run_requires_a_response() {
    let dir = TempDir::new().unwrap();
    proctor()
        .current_dir(dir.path())
        .arg("run")
        .arg("--kind")
        .arg("group-discussion")
        .assert()
        .failure()
        .stderr(predicate::str::contains("a response is required"));
}

#[test]
fn run_rejects_unknown_kind() {
    proctor()
        .arg("run")
        .arg("--kind")
        .arg("obstacle-race")
        .arg("--response")
        .arg("text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --kind"));
}

#[test]
fn run_completes_a_session_against_the_memory_backend() {
    let dir = TempDir::new().unwrap();
    let response = vec!["word"; 320].join(" ");

    proctor()
        .current_dir(dir.path())
        .arg("run")
        .arg("--kind")
        .arg("group-discussion")
        .arg("--response")
        .arg(&response)
        .assert()
        .success()
        .stdout(predicate::str::contains("Captured 320 words"))
        .stdout(predicate::str::contains("Submitted:"))
        .stdout(predicate::str::contains("status: completed"));
}

#[test]
fn run_rejects_short_response_at_review() {
    let dir = TempDir::new().unwrap();

    proctor()
        .current_dir(dir.path())
        .arg("run")
        .arg("--kind")
        .arg("group-discussion")
        .arg("--response")
        .arg("far too short")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 300 words"));
}

#[test]
fn run_enforces_sequential_access() {
    let dir = TempDir::new().unwrap();
    proctor()
        .current_dir(dir.path())
        .arg("run")
        .arg("--kind")
        .arg("lecturette")
        .arg("--response")
        .arg("text")
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"))
        .stderr(predicate::str::contains("Group Discussion"));
}
