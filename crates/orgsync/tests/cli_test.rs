//! Integration tests for the `orgsync` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling, and error reporting without a live server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Nothing listens on port 1, so connections are refused at once.
const DEAD_API: &str = "http://127.0.0.1:1/api";

/// Build a command for the `orgsync` binary with env isolation.
///
/// Clears all `ORGSYNC_*` env vars and points the config and cache
/// directories into `home` so tests never touch the user's real files.
fn orgsync_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("orgsync");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_CACHE_HOME", home.join("cache"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("ORGSYNC_PROFILE")
        .env_remove("ORGSYNC_API_URL")
        .env_remove("ORGSYNC_SOCKET_URL")
        .env_remove("ORGSYNC_OUTPUT")
        .env_remove("ORGSYNC_INSECURE")
        .env_remove("ORGSYNC_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = orgsync_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("orgs")
            .and(predicate::str::contains("staff"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("dashboard")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("orgsync"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_orgs_subcommands_exist() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["orgs", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("get"))
                .and(predicate::str::contains("create"))
                .and(predicate::str::contains("update"))
                .and(predicate::str::contains("delete"))
                .and(predicate::str::contains("export"))
                .and(predicate::str::contains("options")),
        );
}

#[test]
fn test_staff_create_requires_a_known_role() {
    let home = tempfile::tempdir().unwrap();
    let output = orgsync_cmd(home.path())
        .args([
            "--api-url",
            DEAD_API,
            "staff",
            "create",
            "--first-name",
            "Ada",
            "--last-name",
            "Lovelace",
            "--email",
            "ada@example.com",
            "--organization",
            "o1",
            "--role",
            "intern",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("possible values") || text.contains("invalid value"),
        "Expected error about valid roles:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let home = tempfile::tempdir().unwrap();
    let output = orgsync_cmd(home.path())
        .args(["--output", "invalid", "orgs", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_orgs_list_without_config_explains_setup() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["orgs", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No server configured"));
}

#[test]
fn test_unknown_named_profile() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["--profile", "staging", "orgs", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'staging' not found"));
}

#[test]
fn test_config_show_without_file_renders_defaults() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_profile = \"default\""));
}

#[test]
fn test_config_init_then_show_and_refuse_overwrite() {
    let home = tempfile::tempdir().unwrap();

    orgsync_cmd(home.path())
        .args(["config", "init", "--api-url", "http://office.test:3000/api"])
        .assert()
        .success();

    orgsync_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://office.test:3000/api"));

    orgsync_cmd(home.path())
        .args(["--output", "plain", "config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default"));

    orgsync_cmd(home.path())
        .args(["config", "init", "--api-url", "http://other.test/api"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_rejects_bad_url() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["config", "init", "--api-url", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("api_url"));
}

// ── Server errors ───────────────────────────────────────────────────

#[test]
fn test_unreachable_server_uses_connection_exit_code() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["--api-url", DEAD_API, "orgs", "get", "o1"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not reach the server"));
}

#[test]
fn test_update_without_fields_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    orgsync_cmd(home.path())
        .args(["--api-url", DEAD_API, "orgs", "update", "o1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least one field"));
}
