//! CLI integration tests for the non-server subcommands.
//!
//! Uses `assert_cmd` to spawn the `rcaflow` binary and verify
//! exit codes, stdout content, and stderr content.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper: create a Command for the `rcaflow` binary, rooted in an empty
/// directory so no stray rcaflow.toml is picked up.
fn rcaflow(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("rcaflow");
    cmd.current_dir(dir.path());
    cmd.env_remove("RCAFLOW_PORT").env_remove("RCAFLOW_LOG");
    cmd
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("rcaflow.toml");
    fs::write(&path, content).unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    rcaflow(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("conformance"))
        .stdout(predicate::str::contains("check-config"));
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    rcaflow(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    rcaflow(&dir).arg("migrate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. conformance
// ──────────────────────────────────────────────

#[test]
fn conformance_passes_for_memory_backend() {
    let dir = TempDir::new().unwrap();
    rcaflow(&dir)
        .arg("conformance")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conformance:"))
        .stdout(predicate::str::contains("(0 failed)"));
}

#[test]
fn conformance_json_output() {
    let dir = TempDir::new().unwrap();
    let output = rcaflow(&dir)
        .args(["--output", "json", "conformance"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["failed"], 0);
    assert!(json["total"].as_u64().unwrap() > 0);
    assert_eq!(json["failures"].as_array().unwrap().len(), 0);
}

// ──────────────────────────────────────────────
// 3. check-config
// ──────────────────────────────────────────────

#[test]
fn check_config_accepts_valid_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [server]
        port = 9090

        [[users]]
        id = "0b6f4c1e-7a43-4d8e-9f65-2f1f3c9d2a10"
        display_name = "Priya Natarajan"
        role = "admin"
        "#,
    );
    rcaflow(&dir)
        .arg("check-config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn check_config_reports_every_problem() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [server]
        port = 0

        [[users]]
        id = "0b6f4c1e-7a43-4d8e-9f65-2f1f3c9d2a10"
        display_name = ""
        "#,
    );
    rcaflow(&dir)
        .arg("check-config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("server.port must be non-zero"))
        .stderr(predicate::str::contains("blank display_name"));
}

#[test]
fn check_config_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[analysis]\nprovider = \"anthropic\"\nmax_tokens = 0\n");
    let output = rcaflow(&dir)
        .args(["--output", "json", "check-config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["errors"].as_array().unwrap().len(), 1);
}

#[test]
fn check_config_rejects_unparseable_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[server\nport = ");
    rcaflow(&dir)
        .arg("check-config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not parse"));
}

#[test]
fn check_config_missing_file() {
    let dir = TempDir::new().unwrap();
    rcaflow(&dir)
        .arg("check-config")
        .arg("does-not-exist.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn serve_rejects_invalid_config_before_binding() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[logging]\nlevel = \"rcaflow=verbose\"\n");
    rcaflow(&dir)
        .arg("serve")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("logging.level"));
}
