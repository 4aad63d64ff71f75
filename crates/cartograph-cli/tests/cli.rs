//! End-to-end tests for `cg`: each test runs the binary in an isolated temp
//! directory against a hand-written saved history.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A cafe renamed locally, then a bench added next to it.
const SAVED_HISTORY: &str = r#"{
  "version": 3,
  "entities": [
    {"id": "n1", "loc": [0.0, 0.0], "tags": {"amenity": "cafe", "name": "Mine"}, "version": 1, "v": 1},
    {"id": "n-1", "loc": [2.0, 2.0], "tags": {"amenity": "bench"}, "v": 2}
  ],
  "baseEntities": [
    {"id": "n1", "loc": [0.0, 0.0], "tags": {"amenity": "cafe", "name": "Old"}, "version": 1}
  ],
  "stack": [
    {},
    {"modified": ["n1v1"], "annotation": "Renamed the cafe."},
    {"modified": ["n1v1", "n-1v2"], "annotation": "Added a bench."}
  ],
  "nextIDs": {"node": -2, "way": -1, "relation": -1},
  "index": 2,
  "timestamp": 1700000000000
}"#;

fn cg_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cg"));
    cmd.current_dir(dir);
    cmd.env("CARTOGRAPH_LOG", "error");
    cmd.env_remove("CARTOGRAPH_FORMAT");
    cmd.env("XDG_CONFIG_HOME", dir.join("config"));
    cmd.env("HOME", dir);
    cmd
}

fn write_history(dir: &Path) -> PathBuf {
    let path = dir.join("saved_history.json");
    fs::write(&path, SAVED_HISTORY).expect("write history");
    path
}

fn write_remote(dir: &Path, name: &str, version: u64) -> PathBuf {
    let path = dir.join("remote.json");
    let records = serde_json::json!([
        {"id": "n1", "loc": [0.0, 0.0], "tags": {"amenity": "cafe", "name": name}, "version": version}
    ]);
    fs::write(&path, records.to_string()).expect("write remote");
    path
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("cg should not crash");
    assert!(
        output.status.success(),
        "cg failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[test]
fn inspect_reports_cursor_and_annotations() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    let json = json_stdout(cg_cmd(dir.path()).args(["inspect", "--json"]).arg(&history));
    assert_eq!(json["version"], 3);
    assert_eq!(json["index"], 2);
    assert_eq!(json["edits"], 3);
    assert_eq!(json["annotations"], serde_json::json!(["Renamed the cafe.", "Added a bench."]));
    assert_eq!(json["undo_annotation"], "Added a bench.");
    assert_eq!(json["next_ids"]["node"], -2);
    assert!(json["saved_at"].as_str().is_some_and(|s| s.starts_with("2023-11-14")));
}

#[test]
fn inspect_reads_the_project_store_by_default() {
    let dir = TempDir::new().expect("tempdir");
    let store = dir.path().join(".cartograph/history");
    fs::create_dir_all(&store).expect("store dir");
    write_history(&store);
    let json = json_stdout(cg_cmd(dir.path()).args(["inspect", "--json"]));
    assert_eq!(json["index"], 2);
}

#[test]
fn summary_lists_created_and_modified() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    let json = json_stdout(cg_cmd(dir.path()).args(["summary", "--json"]).arg(&history));
    assert_eq!(json["created"], 1);
    assert_eq!(json["modified"], 1);
    assert_eq!(json["deleted"], 0);
    assert_eq!(json["rows"][0]["id"], "n-1");
    assert_eq!(json["rows"][1]["name"], "Mine");
}

#[test]
fn summary_text_is_tab_separated() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    cg_cmd(dir.path())
        .arg("summary")
        .arg(&history)
        .assert()
        .success()
        .stdout(predicate::str::contains("created\tn-1\t"))
        .stdout(predicate::str::contains("modified\tn1\tMine"));
}

#[test]
fn undo_log_marks_the_current_edit() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    let json = json_stdout(cg_cmd(dir.path()).args(["undo-log", "--json"]).arg(&history));
    let entries = json.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["annotation"], "Added a bench.");
    assert_eq!(entries[0]["current"], true);
    assert_eq!(entries[1]["undone"], false);
}

// ---------------------------------------------------------------------------
// merge-check
// ---------------------------------------------------------------------------

#[test]
fn merge_check_is_clean_against_an_unchanged_remote() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    let remote = write_remote(dir.path(), "Old", 1);
    let json = json_stdout(
        cg_cmd(dir.path())
            .args(["merge-check", "--json", "--remote"])
            .arg(&remote)
            .arg(&history),
    );
    assert_eq!(json["status"], "clean");
    assert_eq!(json["upload"]["modified"], serde_json::json!(["n1"]));
    assert_eq!(json["upload"]["created"], serde_json::json!(["n-1"]));
}

#[test]
fn merge_check_fails_on_unresolved_conflicts() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    let remote = write_remote(dir.path(), "Theirs", 2);
    let output = cg_cmd(dir.path())
        .args(["merge-check", "--json", "--remote"])
        .arg(&remote)
        .arg(&history)
        .output()
        .expect("cg should not crash");
    assert_eq!(output.status.code(), Some(1));
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["status"], "conflicts");
    assert_eq!(json["conflicts"][0]["id"], "n1");
    assert_eq!(
        json["conflicts"][0]["choices"],
        serde_json::json!(["keep mine", "use theirs"])
    );
}

#[test]
fn merge_check_settles_conflicts_with_a_strategy() {
    let dir = TempDir::new().expect("tempdir");
    let history = write_history(dir.path());
    let remote = write_remote(dir.path(), "Theirs", 2);
    let json = json_stdout(
        cg_cmd(dir.path())
            .args(["merge-check", "--json", "--strategy", "mine", "--remote"])
            .arg(&remote)
            .arg(&history),
    );
    assert_eq!(json["status"], "clean");
    assert_eq!(json["resolved"][0]["choice"], "keep mine");
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn corrupt_history_reports_a_stable_code() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").expect("write");
    let output = cg_cmd(dir.path())
        .args(["inspect", "--json"])
        .arg(&path)
        .output()
        .expect("cg should not crash");
    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(json["error"]["error_code"], "E3002");
    assert!(json["error"]["suggestion"].as_str().is_some());
}

#[test]
fn missing_history_is_reported_in_text_mode() {
    let dir = TempDir::new().expect("tempdir");
    cg_cmd(dir.path())
        .args(["summary", "nowhere.json"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error: no saved history"));
}

#[test]
fn unsupported_version_maps_to_its_code() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("old.json");
    fs::write(&path, r#"{"version":1,"stack":[{}],"index":0}"#).expect("write");
    cg_cmd(dir.path())
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E3001]"));
}

// ---------------------------------------------------------------------------
// sim and completions
// ---------------------------------------------------------------------------

#[test]
fn sim_run_passes_a_small_calm_campaign() {
    let dir = TempDir::new().expect("tempdir");
    let json = json_stdout(cg_cmd(dir.path()).args([
        "sim", "run", "--seeds", "3", "--rounds", "12", "--outages", "0", "--races", "0", "--json",
    ]));
    assert_eq!(json["seeds_run"], 3);
    assert_eq!(json["all_passed"], true);
}

#[test]
fn sim_replay_prints_a_trace() {
    let dir = TempDir::new().expect("tempdir");
    let json = json_stdout(cg_cmd(dir.path()).args([
        "sim", "replay", "--seed", "4", "--rounds", "12", "--outages", "0", "--races", "0", "--json",
    ]));
    assert_eq!(json["seed"], 4);
    assert_eq!(json["passed"], true);
    assert!(json["trace"].as_array().is_some_and(|t| !t.is_empty()));
}

#[test]
fn completions_name_the_binary() {
    let dir = TempDir::new().expect("tempdir");
    cg_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cg"));
}
