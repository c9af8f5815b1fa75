//! CLI smoke tests that spawn the `deskmate` binary. Only commands
//! with no provider dependency are exercised here; the answering path
//! is covered by the stub-provider tests in `integration.rs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn deskmate_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("deskmate");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/deskmate.db"

[server]
bind = "127.0.0.1:7878"
"#,
        root.display()
    );

    let config_path = config_dir.join("deskmate.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_deskmate(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = deskmate_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run deskmate binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_deskmate(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/deskmate.db").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_deskmate(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_deskmate(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_docs_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_deskmate(&config_path, &["init"]);
    let (stdout, stderr, success) = run_deskmate(&config_path, &["docs"]);
    assert!(success, "docs failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No documents indexed"));
}

#[test]
fn test_messages_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_deskmate(&config_path, &["init"]);
    let (stdout, _, success) = run_deskmate(&config_path, &["messages"]);
    assert!(success);
    assert!(stdout.contains("No messages stored"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("nope.toml");
    let (_, _, success) = run_deskmate(&bogus, &["init"]);
    assert!(!success);
}
