//! Integration tests for the `vigil` CLI binary.
//!
//! These tests cover argument parsing, help output, shell completions,
//! offline status/logout against a temporary data directory, and error
//! exit codes -- all without a live platform.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `vigil` binary with env isolation.
///
/// Clears all `VIGIL_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn vigil_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("vigil");
    cmd.env("HOME", "/tmp/vigil-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/vigil-cli-test-nonexistent")
        .env("XDG_DATA_HOME", "/tmp/vigil-cli-test-nonexistent")
        .env("VIGIL_CONFIG", "/tmp/vigil-cli-test-nonexistent/config.toml")
        .env_remove("VIGIL_PROFILE")
        .env_remove("VIGIL_URL")
        .env_remove("VIGIL_STREAM_URL")
        .env_remove("VIGIL_TOKEN")
        .env_remove("VIGIL_DATA_DIR")
        .env_remove("VIGIL_OUTPUT")
        .env_remove("VIGIL_INSECURE")
        .env_remove("VIGIL_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_key(dir: &Path, key: &str, json: &str) {
    std::fs::write(dir.join(format!("{key}.json")), json).unwrap();
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = vigil_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    vigil_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("alarm")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("sync"))
            .and(predicate::str::contains("status")),
    );
}

#[test]
fn test_version_flag() {
    vigil_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vigil"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    vigil_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    vigil_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Offline commands ────────────────────────────────────────────────

#[test]
fn test_status_on_empty_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    vigil_cmd()
        .args(["status", "--color", "never", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("never fetched").and(predicate::str::contains("Sync phase")),
        );
}

#[test]
fn test_status_reads_persisted_snapshot_as_json() {
    let dir = tempfile::tempdir().unwrap();
    write_key(
        dir.path(),
        "vigil.version",
        r#"{"global_version":"v7","user_version":"u3"}"#,
    );
    write_key(
        dir.path(),
        "vigil.alarm-count",
        r#"{"value":4,"last_update":"2026-01-01T00:00:00Z","source":"FilteredFetch"}"#,
    );

    let output = vigil_cmd()
        .args(["status", "-o", "json", "--data-dir"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["global_version"], "v7");
    assert_eq!(report["user_version"], "u3");
    assert_eq!(report["alarm_count"]["value"], 4);
    assert!(report["items"].is_null());
    assert_eq!(report["sync"]["is_syncing"], false);
}

#[test]
fn test_status_plain_prints_count_only() {
    let dir = tempfile::tempdir().unwrap();
    write_key(
        dir.path(),
        "vigil.alarm-count",
        r#"{"value":11,"last_update":null,"source":"FilteredFetch"}"#,
    );
    vigil_cmd()
        .args(["status", "-o", "plain", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout("11\n");
}

#[test]
fn test_status_never_reports_a_stale_sync_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    write_key(
        dir.path(),
        "vigil.sync-status",
        r#"{"phase":"Items","is_syncing":true,"last_error":null,"last_completed_at":null}"#,
    );
    let output = vigil_cmd()
        .args(["status", "-o", "json", "--data-dir"])
        .arg(dir.path())
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["sync"]["is_syncing"], false);
    assert_eq!(report["sync"]["phase"], "Idle");
}

#[test]
fn test_logout_clears_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_key(
        dir.path(),
        "vigil.version",
        r#"{"global_version":"v7","user_version":null}"#,
    );
    write_key(dir.path(), "vigil.items", r#"{"payload":[],"fetched_at":"2026-01-01T00:00:00Z","ttl":{"secs":60,"nanos":0}}"#);

    vigil_cmd()
        .args(["logout", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));

    assert!(!dir.path().join("vigil.version.json").exists());
    assert!(!dir.path().join("vigil.items.json").exists());
    // The logout notice for other instances stays behind.
    assert!(dir.path().join("vigil.bus.json").exists());
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = vigil_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_sync_without_platform_fails() {
    vigil_cmd()
        .arg("sync")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No platform configured"));
}

#[test]
fn test_count_without_token_is_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    vigil_cmd()
        .args(["count", "--url", "http://127.0.0.1:9", "--data-dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No token configured"));
}

#[test]
fn test_invalid_url_is_usage_error() {
    vigil_cmd()
        .args(["count", "--url", "not a url", "--token", "t"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_unknown_profile_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        "[profiles.plant]\nurl = \"https://scada.plant.local\"\n",
    )
    .unwrap();

    vigil_cmd()
        .env("VIGIL_CONFIG", &config)
        .args(["sync", "--profile", "lab"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plant"));
}

#[test]
fn test_unreachable_platform_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    vigil_cmd()
        .args([
            "count",
            "--url",
            "http://127.0.0.1:9",
            "--token",
            "t0ken",
            "--timeout",
            "2",
            "--data-dir",
        ])
        .arg(dir.path())
        .assert()
        .failure()
        .code(7);
}
