//! Integration tests for the `homelink` binary.
//!
//! Argument parsing, help output, completions, config management and the
//! REST-backed history command, without a live Home Assistant instance.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `homelink` binary with env isolation.
///
/// Clears all `HOMELINK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn homelink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("homelink");
    cmd.env("HOME", "/tmp/homelink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/homelink-cli-test-nonexistent")
        .env_remove("HOMELINK_PROFILE")
        .env_remove("HOMELINK_URL")
        .env_remove("HOMELINK_TOKEN")
        .env_remove("HOMELINK_CONFIG")
        .env_remove("HOMELINK_OUTPUT")
        .env_remove("HOMELINK_INSECURE")
        .env_remove("HOMELINK_TIMEOUT")
        .env_remove("HOMELINK_RELAY")
        .env_remove("RUST_LOG");
    cmd
}

/// Same, with `--config` pointing at `file`.
fn with_config(file: &Path) -> assert_cmd::Command {
    let mut cmd = homelink_cmd();
    cmd.arg("--config").arg(file);
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = homelink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    homelink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("serve")
            .and(predicate::str::contains("states"))
            .and(predicate::str::contains("call"))
            .and(predicate::str::contains("history"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    homelink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("homelink"));
}

#[test]
fn test_invalid_subcommand() {
    homelink_cmd().arg("frobnicate").assert().code(2);
}

#[test]
fn test_invalid_output_format() {
    homelink_cmd()
        .args(["--output", "xml", "states"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("xml"));
}

#[test]
fn test_history_start_requires_end() {
    homelink_cmd()
        .args(["history", "sensor.power", "--start", "2026-02-10T00:00:00Z"])
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    homelink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("homelink"));
}

#[test]
fn test_completions_zsh() {
    homelink_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    with_config(&file)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(file.display().to_string()));
}

#[test]
fn test_config_init_then_profiles_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("config.toml");

    with_config(&file)
        .args([
            "--token",
            "plain-secret",
            "config",
            "init",
            "--name",
            "home",
            "--base-url",
            "http://homeassistant.local:8123",
            "--default",
        ])
        .assert()
        .success();
    assert!(file.exists());

    let output = with_config(&file)
        .args(["-o", "json", "config", "profiles"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let profiles: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        profiles,
        json!([{ "name": "home", "url": "http://homeassistant.local:8123", "default": true }])
    );

    with_config(&file)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********").and(predicate::str::contains("plain-secret").not()));
}

#[test]
fn test_config_use_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    with_config(&file)
        .args(["config", "use", "lab"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'lab' not found"));
}

// ── Backend commands without a backend ──────────────────────────────

#[test]
fn test_states_without_config_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    with_config(&dir.path().join("config.toml"))
        .arg("states")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No backend configured"));
}

#[test]
fn test_states_without_token_is_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    std::fs::write(
        &file,
        "default_profile = \"home\"\n\n[profiles.home]\nurl = \"http://127.0.0.1:9\"\ntoken_env = \"HOMELINK_TEST_UNSET_TOKEN\"\n",
    )
    .unwrap();

    // The keyring may be unavailable here; either way no token resolves.
    with_config(&file)
        .env_remove("HOMELINK_TEST_UNSET_TOKEN")
        .arg("states")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No access token"));
}

#[test]
fn test_states_unreachable_backend_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    with_config(&dir.path().join("config.toml"))
        .args(["--url", "http://127.0.0.1:9", "--token", "tok", "states"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not connect"));
}

// ── History over REST ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_history_renders_backend_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/history/period/2026-02-10T00"))
        .and(query_param("filter_entity_id", "sensor.power"))
        .and(query_param("end_time", "2026-02-11T00:00:00Z"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[
            { "entity_id": "sensor.power", "state": "120", "last_changed": "2026-02-10T01:00:00+00:00" },
            { "entity_id": "sensor.power", "state": "135", "last_changed": "2026-02-10T02:00:00+00:00" }
        ]])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    let url = server.uri();

    let output = tokio::task::spawn_blocking(move || {
        with_config(&file)
            .args([
                "--url",
                &url,
                "--token",
                "tok",
                "-o",
                "plain",
                "history",
                "sensor.power",
                "--start",
                "2026-02-10T00:00:00Z",
                "--end",
                "2026-02-11T00:00:00Z",
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "120\n135\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_history_upstream_404_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/history/period/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    let url = server.uri();

    let output = tokio::task::spawn_blocking(move || {
        with_config(&file)
            .args(["--url", &url, "--token", "tok", "history", "sensor.power", "--since", "2h"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
}
