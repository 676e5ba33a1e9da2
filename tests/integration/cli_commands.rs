//! End-to-end tests of the command line surface

use assert_cmd::Command;
use likes_archiver::archive::LocalArchive;
use likes_archiver::ledger::{ErrorDetails, ErrorKind, ErrorLedger};
use likes_archiver::processed::{Bucket, ProcessedSet};
use likes_archiver::state;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("likes-archiver").unwrap();
    cmd.env("RUST_LOG", "likes_archiver=warn")
        .arg("--state-dir")
        .arg(dir.join("state"))
        .arg("--archive-dir")
        .arg(dir.join("archive"));
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().last().unwrap_or_default();
    serde_json::from_str(line).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::cargo_bin("likes-archiver")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "errors", "reconcile", "validate"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_errors_stats_on_empty_state() {
    let dir = TempDir::new().unwrap();
    let output = cli(dir.path())
        .args(["errors", "stats", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["total_errors"], 0);
}

#[test]
fn test_errors_retry_clears_record_and_failed_mark() {
    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    {
        let mut ledger = ErrorLedger::load(state::ledger_path(&state_dir));
        ledger
            .add_error("11", ErrorKind::Media404, ErrorDetails::message("HTTP 404"))
            .unwrap();
        ledger
            .add_error("12", ErrorKind::RateLimit, ErrorDetails::message("HTTP 429"))
            .unwrap();
        let mut processed = ProcessedSet::load(state::processed_path(&state_dir));
        processed.mark("11", Bucket::Failed);
        processed.save().unwrap();
    }

    let output = cli(dir.path())
        .args(["--output-format", "json", "errors", "list", "--kind", "media_404"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let listed = stdout_json(&output);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], "11");
    assert_eq!(listed[0]["retryCount"], 1);

    cli(dir.path()).args(["errors", "retry", "11"]).assert().success();

    let ledger = ErrorLedger::load(state::ledger_path(&state_dir));
    assert!(!ledger.has_error("11"));
    assert!(ledger.has_error("12"));
    assert_eq!(ledger.statistics().total_errors, 1);
    let processed = ProcessedSet::load(state::processed_path(&state_dir));
    assert!(!processed.contains("11"));

    cli(dir.path()).args(["errors", "clear", "--all"]).assert().success();
    assert!(ErrorLedger::load(state::ledger_path(&state_dir)).is_empty());
}

#[test]
fn test_errors_list_rejects_unknown_kind() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["errors", "list", "--kind", "teapot"])
        .assert()
        .failure();
}

#[test]
fn test_run_with_local_metadata_only() {
    let dir = TempDir::new().unwrap();
    let archive = LocalArchive::new(dir.path().join("archive"));
    archive
        .write_metadata("1001", &json!({ "id": "1001", "text": "no pictures" }))
        .unwrap();
    archive
        .write_metadata("1002", &json!({ "id": "1002", "media": [] }))
        .unwrap();

    let export = dir.path().join("like.js");
    std::fs::write(
        &export,
        r#"window.YTD.like.part0 = [
  { "like": { "tweetId": "1001" } },
  { "like": { "tweetId": "1002" } }
]"#,
    )
    .unwrap();

    let output = cli(dir.path())
        .args(["--output-format", "json", "run", "--export"])
        .arg(&export)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary = stdout_json(&output);
    assert_eq!(summary["requested"], 2);
    assert_eq!(summary["no_media"], 2);
    assert_eq!(summary["halted"], false);

    let processed = ProcessedSet::load(state::processed_path(&dir.path().join("state")));
    assert_eq!(processed.count(Bucket::NoMedia), 2);
}

#[test]
fn test_run_requires_readable_export() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["run", "--export"])
        .arg(dir.path().join("missing.js"))
        .assert()
        .failure();
}

#[test]
fn test_run_rejects_out_of_range_concurrency() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .args(["run", "--export", "like.js", "--concurrency", "64"])
        .assert()
        .failure();
}

#[test]
fn test_reconcile_and_validate() {
    let dir = TempDir::new().unwrap();
    let archive = LocalArchive::new(dir.path().join("archive"));
    archive
        .write_metadata("1", &json!({ "id": "1", "media": [] }))
        .unwrap();
    std::fs::create_dir_all(archive.item_dir("2")).unwrap();

    // "2" has no metadata
    cli(dir.path()).arg("validate").assert().failure();

    let output = cli(dir.path())
        .args(["--output-format", "json", "reconcile"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["recovered"], json!(["1"]));
    assert_eq!(report["successful"], 1);

    std::fs::remove_dir(archive.item_dir("2")).unwrap();
    cli(dir.path()).arg("validate").assert().success();
}
