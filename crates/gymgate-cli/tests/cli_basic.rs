//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. All
//! commands run with GYMGATE_ENV=dev so nothing touches the real
//! config directory.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "gymgate-cli", "--"])
        .args(args)
        .env("GYMGATE_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_help() {
    let (stdout, _, code) = run_cli(&["--help"]);
    assert_eq!(code, 0, "help failed");
    assert!(stdout.contains("session"));
    assert!(stdout.contains("config"));
}

#[test]
fn test_geo_check_explicit_home() {
    let (stdout, _, code) = run_cli(&[
        "geo", "check", "--lat", "35.6812", "--lon", "139.7771", "--home-lat", "35.6812",
        "--home-lon", "139.7671", "--radius", "100",
    ]);
    assert_eq!(code, 0, "geo check failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["presence"], "away");
    assert_eq!(parsed["at_gym"], true);
    assert!(parsed["distance_m"].as_f64().unwrap() > 100.0);
}

#[test]
fn test_geo_check_at_home() {
    let (stdout, _, code) = run_cli(&[
        "geo", "check", "--lat", "35.6812", "--lon", "139.7671", "--home-lat", "35.6812",
        "--home-lon", "139.7671", "--radius", "100",
    ]);
    assert_eq!(code, 0, "geo check failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["presence"], "home");
}

#[test]
fn test_config_list() {
    let (stdout, _, code) = run_cli(&["config", "list"]);
    assert_eq!(code, 0, "config list failed");
    assert!(stdout.contains("gym_time"));
}

#[test]
fn test_config_set_and_get() {
    let (_, _, code) = run_cli(&["config", "set", "wake_up_delay_min", "7"]);
    assert_eq!(code, 0, "config set failed");
    let (stdout, _, code) = run_cli(&["config", "get", "wake_up_delay_min"]);
    assert_eq!(code, 0, "config get failed");
    assert_eq!(stdout.trim(), "7");
}

#[test]
fn test_config_get_unknown_key_fails() {
    let (_, stderr, code) = run_cli(&["config", "get", "no_such_key"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_completions_generate() {
    let (stdout, _, code) = run_cli(&["completions", "bash"]);
    assert_eq!(code, 0, "completions failed");
    assert!(stdout.contains("gymgate"));
}
