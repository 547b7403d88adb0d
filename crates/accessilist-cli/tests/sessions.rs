use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_accessilist"))
}

fn run(dir: &TempDir, args: &[&str]) -> Output {
    bin()
        .arg("--sessions-dir")
        .arg(dir.path())
        .args(args)
        .output()
        .expect("run accessilist")
}

fn run_json(dir: &TempDir, args: &[&str]) -> Value {
    let output = run(dir, args);
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value.get("ok").and_then(Value::as_bool), Some(true));
    value
}

#[test]
fn instantiate_is_idempotent() {
    let dir = TempDir::new().expect("sessions");
    let first = run_json(&dir, &["instantiate", "ABC", "--type", "word", "--json"]);
    assert_eq!(first["created"], true);
    let second = run_json(&dir, &["instantiate", "ABC", "--type", "excel", "--json"]);
    assert_eq!(second["created"], false);

    let shown = run_json(&dir, &["show", "ABC", "--json"]);
    assert_eq!(shown["checklist"]["typeSlug"], "word");
}

#[test]
fn notes_and_status_clicks_are_saved() {
    let dir = TempDir::new().expect("sessions");
    run_json(&dir, &["instantiate", "ABC", "--type", "word", "--json"]);

    let noted = run_json(&dir, &["note", "ABC", "1.1", "looks good", "--json"]);
    assert_eq!(noted["row"]["status"]["state"], "active");
    assert_eq!(noted["row"]["status"]["flag"], "active-auto");

    let clicked = run_json(&dir, &["status", "ABC", "1.1", "--json"]);
    assert_eq!(clicked["row"]["status"]["state"], "done");

    let shown = run_json(&dir, &["show", "ABC", "--json"]);
    assert!(shown["metadata"]["lastModified"].as_i64().is_some());
    let row = &shown["checklist"]["checkpoints"][0]["rows"][0];
    assert_eq!(row["id"], "1.1");
    assert_eq!(row["notes"], "looks good");
    assert_eq!(row["status"]["state"], "done");
    assert_eq!(row["restartVisible"], true);

    let reset = run_json(&dir, &["reset", "ABC", "1.1", "--json"]);
    assert_eq!(reset["row"]["status"]["state"], "ready");
    assert_eq!(reset["row"]["notes"], "");
}

#[test]
fn manual_rows_can_be_added_and_deleted() {
    let dir = TempDir::new().expect("sessions");
    run_json(&dir, &["instantiate", "CAM-1", "--type", "camtasia", "--json"]);

    let first = run_json(&dir, &["add-row", "CAM-1", "2", "Check audio", "--json"]);
    assert_eq!(first["row"]["id"], "2.3");
    assert_eq!(first["row"]["manual"], true);
    let second = run_json(&dir, &["add-row", "CAM-1", "2", "Check captions", "--json"]);
    assert_eq!(second["row"]["id"], "2.4");

    run_json(&dir, &["delete-row", "CAM-1", "2.3", "--json"]);
    let shown = run_json(&dir, &["show", "CAM-1", "--json"]);
    let rows = shown["checklist"]["checkpoints"][1]["rows"]
        .as_array()
        .expect("rows");
    let last = rows.last().expect("row");
    assert_eq!(last["id"], "2.3");
    assert_eq!(last["task"], "Check captions");

    let refused = run(&dir, &["delete-row", "CAM-1", "2.1"]);
    assert!(!refused.status.success());
}

#[test]
fn deleting_a_missing_session_fails() {
    let dir = TempDir::new().expect("sessions");
    run_json(&dir, &["instantiate", "AAA", "--json"]);
    let output = run(&dir, &["delete", "XYZ"]);
    assert!(!output.status.success());
    assert!(dir.path().join("AAA.json").is_file());

    run_json(&dir, &["delete", "AAA", "--json"]);
    assert!(!dir.path().join("AAA.json").exists());
}

#[test]
fn list_and_report_cover_every_session() {
    let dir = TempDir::new().expect("sessions");
    run_json(&dir, &["instantiate", "AAA", "--type", "word", "--json"]);
    run_json(&dir, &["instantiate", "BBB", "--type", "docs", "--json"]);
    run_json(&dir, &["status", "BBB", "1.1", "--json"]);

    let listed = run_json(&dir, &["list", "--json"]);
    assert_eq!(listed["sessions"].as_array().expect("sessions").len(), 2);

    let report = run_json(&dir, &["report", "--json"]);
    let by_type = &report["report"]["byType"];
    assert_eq!(by_type["word"]["sessions"], 1);
    assert_eq!(by_type["docs"]["counts"]["active"], 1);
}

#[test]
fn generated_key_is_not_reserved() {
    let dir = TempDir::new().expect("sessions");
    for _ in 0..20 {
        let value = run_json(&dir, &["generate-key", "--json"]);
        let key = value["sessionKey"].as_str().expect("key");
        assert_eq!(key.len(), 3);
        assert!(!["WRD", "PPT", "XLS", "DOC", "SLD", "CAM", "DJO"].contains(&key));
    }
}
