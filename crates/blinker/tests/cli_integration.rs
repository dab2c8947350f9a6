//! Integration tests for the `blinker` binary.
//!
//! These tests exercise the CLI binary via `assert_cmd`. Device commands are
//! pointed at a closed local port through a temporary config file, so they
//! never depend on real hardware or a WLED controller on the network.

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli() -> assert_cmd::Command {
    cargo_bin_cmd!("blinker")
}

/// Temp dir holding a config that targets a port nothing listens on.
fn unreachable_config() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "wled_address = \"127.0.0.1:9\"\n\
         request_timeout = 1.0\n\
         reconnect_delay = 0.1\n\
         retry_delay = 0.1\n\
         max_retries = 1\n",
    )
    .unwrap();
    (dir, path)
}

#[test]
fn cli_help_succeeds() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("blinker"))
        .stdout(predicate::str::contains("simulate"));
}

#[test]
fn cli_version_prints_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_no_subcommand_fails() {
    cli().assert().failure();
}

// ── config ──

#[test]
fn cli_config_json_produces_valid_json() {
    let (_dir, path) = unreachable_config();
    let output = cli()
        .args(["--json", "config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value =
        serde_json::from_slice(&output).expect("config --json should produce valid JSON");
    assert!(json["settings"].is_object());
    assert_eq!(json["settings"]["wled_address"], "127.0.0.1:9");
    assert_eq!(json["settings"]["input_pin"], 18);
    assert_eq!(json["config_file_exists"], true);
    assert_eq!(json["valid"], true);
}

#[test]
fn cli_config_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    cli()
        .arg("config")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("not found, using defaults"))
        .stdout(predicate::str::contains("192.168.1.15"));
}

#[test]
fn cli_config_reports_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "flash_brightness = 300\n").unwrap();
    let output = cli()
        .args(["--json", "config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["valid"], false);
    assert!(json["errors"][0].as_str().unwrap().contains("flash_brightness"));
}

#[test]
fn cli_config_masks_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "wled_username = \"admin\"\nwled_password = \"hunter2\"\n").unwrap();
    cli()
        .args(["--json", "config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn cli_config_init_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    cli()
        .args(["config", "--init", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote defaults"))
        .stdout(predicate::str::contains("(loaded)"));
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("# Blinker configuration"));
    assert!(raw.contains("gpio_chip = \"/dev/gpiochip0\""));

    // A second run leaves the file alone
    std::fs::write(&path, "input_pin = 17\n").unwrap();
    cli()
        .args(["config", "--init", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("left unchanged"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "input_pin = 17\n");
}

// ── --verbose flag ──

#[test]
fn cli_verbose_flag_accepted() {
    let (_dir, path) = unreachable_config();
    cli().args(["-v", "config", "--config"]).arg(&path).assert().success();
}

#[test]
fn cli_verbose_long_flag_accepted() {
    let (_dir, path) = unreachable_config();
    cli()
        .args(["--verbose", "config", "--config"])
        .arg(&path)
        .assert()
        .success();
}

// ── Device commands against an unreachable controller ──

#[test]
fn cli_status_reports_unreachable() {
    let (_dir, path) = unreachable_config();
    let output = cli()
        .args(["--json", "status", "--config"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["wled"]["reachable"], false);
    assert_eq!(json["wled"]["url"], "http://127.0.0.1:9");
    assert!(json["wled"]["device"].is_null());
    assert!(json["wled"]["error"].is_string());
}

#[test]
fn cli_effects_fails_when_unreachable() {
    let (_dir, path) = unreachable_config();
    cli()
        .args(["effects", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn cli_simulate_fails_when_unreachable() {
    let (_dir, path) = unreachable_config();
    cli()
        .args(["simulate", "short", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("WLED link unavailable"));
}

#[test]
fn cli_simulate_rejects_unknown_kind() {
    cli()
        .args(["simulate", "medium"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn cli_run_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "input_pin = 99\n").unwrap();
    cli()
        .args(["run", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("input_pin"));
}

#[test]
fn cli_run_fails_fast_without_gpio_chip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let chip = dir.path().join("gpiochip9");
    std::fs::write(&path, format!("gpio_chip = {:?}\n", chip.display().to_string())).unwrap();
    cli()
        .args(["run", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input line unavailable"));
}
