use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tlh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tlh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let logs_dir = root.join("logs");
    fs::create_dir_all(logs_dir.join("core")).unwrap();
    fs::write(
        logs_dir.join("core/msc.log"),
        "2024-03-01T10:00:00Z INFO [MSC] node startup complete\n\
         2024-03-01T10:00:05Z ERROR [MSC] SCTP link to HLR failed\n\
         2024-03-01T10:00:09Z WARNING [BSC] signal quality degraded on cell 12\n",
    )
    .unwrap();
    fs::write(
        logs_dir.join("enodeb.log"),
        "Mar  1 10:00:00 enb-17 S1AP: S1 setup with MME complete\n\
         Mar  1 10:00:04 enb-17 RRC: cell 3 carrier up\n",
    )
    .unwrap();
    fs::write(
        logs_dir.join("notes.txt"),
        "remember to buy milk\nand eggs\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/tlh.sqlite"

[services]
mode = "offline"
dims = 64

[vector_store]
backend = "sqlite"
top_k = 3
"#,
        root.display()
    );

    let config_path = config_dir.join("tlh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tlh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tlh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tlh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn logs_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("logs")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tlh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tlh(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tlh(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_analyze_log_completes() {
    let (_tmp, config_path) = setup_test_env();
    let log = logs_dir(&config_path).join("core/msc.log");

    run_tlh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tlh(&config_path, &["analyze", log.to_str().unwrap()]);
    assert!(success, "analyze failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("artifact: 1"));
    assert!(stdout.contains("status: completed"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_analyze_rejects_non_telecom_text() {
    let (_tmp, config_path) = setup_test_env();
    let notes = logs_dir(&config_path).join("notes.txt");

    run_tlh(&config_path, &["init"]);
    let (_, stderr, success) = run_tlh(&config_path, &["analyze", notes.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("input rejected"), "stderr: {}", stderr);

    let (stdout, _, _) = run_tlh(&config_path, &["activities"]);
    assert!(stdout.contains("No activity."));
}

#[test]
fn test_show_prints_analysis_and_activity() {
    let (_tmp, config_path) = setup_test_env();
    let log = logs_dir(&config_path).join("core/msc.log");

    run_tlh(&config_path, &["init"]);
    run_tlh(&config_path, &["analyze", log.to_str().unwrap()]);

    let (stdout, stderr, success) = run_tlh(&config_path, &["show", "1"]);
    assert!(success, "show failed: {}", stderr);
    assert!(stdout.contains("filename:   msc.log"));
    assert!(stdout.contains("severity:   high"));
    assert!(stdout.contains("(first seen 2024-03-01T10:00:05Z)"));
    assert!(stdout.contains("upload"));
    assert!(stdout.contains("Processing completed"));

    let (json, _, success) = run_tlh(&config_path, &["show", "1", "--json"]);
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["artifact"]["processing_status"], "completed");
    assert_eq!(value["result"]["severity"], "high");
}

#[test]
fn test_show_unknown_artifact_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_tlh(&config_path, &["init"]);
    let (_, stderr, success) = run_tlh(&config_path, &["show", "42"]);
    assert!(!success);
    assert!(stderr.contains("Artifact not found: 42"));
}

#[test]
fn test_ingest_directory() {
    let (_tmp, config_path) = setup_test_env();
    let dir = logs_dir(&config_path);

    run_tlh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tlh(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("artifacts: 2"), "got: {}", stdout);
    assert!(stdout.contains("completed: 2"));
    assert!(stdout.contains("rejected: 1"));
    assert!(stdout.contains("notes.txt"));
}

#[test]
fn test_search_finds_indexed_chunk() {
    let (_tmp, config_path) = setup_test_env();
    let dir = logs_dir(&config_path);

    run_tlh(&config_path, &["init"]);
    run_tlh(&config_path, &["ingest", dir.to_str().unwrap()]);

    let query = "Mar  1 10:00:04 enb-17 RRC: cell 3 carrier up\n";
    let (stdout, stderr, success) = run_tlh(&config_path, &["search", query]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. [1.00]"), "got: {}", stdout);
    assert!(stdout.contains("summary:"));
}

#[test]
fn test_resolve_updates_status() {
    let (_tmp, config_path) = setup_test_env();
    let log = logs_dir(&config_path).join("core/msc.log");

    run_tlh(&config_path, &["init"]);
    run_tlh(&config_path, &["analyze", log.to_str().unwrap()]);

    let (stdout, stderr, success) = run_tlh(&config_path, &["resolve", "1", "resolved"]);
    assert!(success, "resolve failed: {}", stderr);
    assert!(stdout.contains("artifact 1: resolved"));

    let (_, stderr, success) = run_tlh(&config_path, &["resolve", "1", "fixed-ish"]);
    assert!(!success);
    assert!(stderr.contains("Unknown resolution status"));

    let (stdout, _, _) = run_tlh(&config_path, &["activities", "--artifact", "1", "--limit", "1"]);
    assert!(stdout.contains("status"));
    assert!(stdout.contains("Resolution status set to resolved"));
}

#[test]
fn test_parse_reports_formats() {
    let (_tmp, config_path) = setup_test_env();
    let log = logs_dir(&config_path).join("enodeb.log");

    let (stdout, stderr, success) = run_tlh(&config_path, &["parse", log.to_str().unwrap()]);
    assert!(success, "parse failed: {}", stderr);
    assert!(stdout.contains("valid telecom log: true"));
    assert!(stdout.contains("lines: 2"));
    assert!(stdout.contains("syslog"));

    let (json, _, success) = run_tlh(&config_path, &["parse", log.to_str().unwrap(), "--json"]);
    assert!(success);
    let records: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 2);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_tlh(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
