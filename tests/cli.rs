use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

const NOW: &str = "2026-06-15T08:10:00";

fn write_config(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("widget.json");
    fs::write(&path, json).expect("write json");
    path
}

fn end_mode_json() -> &'static str {
    r#"
{
  "mode": "end",
  "device_timer_interval": 30,
  "default_time": "12:00",
  "programs": [
    { "name": "Eco", "duration": 150, "offset": 10 },
    { "name": "Quick", "duration": 30 }
  ]
}
"#
}

#[test]
fn once_reports_start_mode_delay() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, r#"{ "default_time": "12:00" }"#);

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--now")
        .arg(NOW)
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Device timer: 240 min"))
        .stdout(predicate::str::contains("Delay: 4h 00m"));
}

#[test]
fn once_reports_end_mode_delay_for_first_program() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, end_mode_json());

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--now")
        .arg(NOW)
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Program: Eco"))
        .stdout(predicate::str::contains("Device timer: 390 min (interval 30 min)"));
}

#[test]
fn once_json_emits_snapshot() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, end_mode_json());

    let mut cmd = cargo_bin_cmd!("delaystart");
    let output = cmd
        .arg("--once")
        .arg("--json")
        .arg("--now")
        .arg(NOW)
        .arg("--config")
        .arg(config)
        .output()
        .expect("run delaystart");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(value["mode"], "end");
    assert_eq!(value["delay_minutes"], 390);
    assert_eq!(value["device_timer_interval"], 30);
    assert_eq!(value["selected_program"], "Eco");
}

#[test]
fn price_seconds_snaps_to_best_price() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(
        &dir,
        r#"{ "default_time": "12:00", "price_entity": "sensor.cheapest_in" }"#,
    );

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--now")
        .arg(NOW)
        .arg("--price-seconds")
        .arg("7200")
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected time: 10:10"))
        .stdout(predicate::str::contains("Best price: 10:10 (following: yes)"))
        .stdout(predicate::str::contains("Delay: 2h 00m"));
}

#[test]
fn unknown_price_keeps_manual_time() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(
        &dir,
        r#"{ "default_time": "12:00", "price_entity": "sensor.cheapest_in" }"#,
    );

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--now")
        .arg(NOW)
        .arg("--price-seconds")
        .arg("unavailable")
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected time: 12:00"))
        .stdout(predicate::str::contains("Best price: not available"));
}

#[test]
fn price_seconds_without_entity_fails() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, r#"{ "default_time": "12:00" }"#);

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--price-seconds")
        .arg("60")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires price_entity"));
}

#[test]
fn malformed_json_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, "{ not-valid-json ");

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn invalid_mode_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, r#"{ "mode": "middle" }"#);

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid mode 'middle'"));
}

#[test]
fn misspelled_config_key_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, r#"{ "device_timer_intervall": 30 }"#);

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "unknown config key(s): device_timer_intervall",
        ));
}

#[test]
fn end_mode_without_programs_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, r#"{ "mode": "end" }"#);

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a non-empty programs list"));
}

#[test]
fn missing_config_file_fails() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("absent.json");

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--config")
        .arg(missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to read widget config"));
}

#[test]
fn invalid_now_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir, r#"{ "default_time": "12:00" }"#);

    let mut cmd = cargo_bin_cmd!("delaystart");
    cmd.arg("--once")
        .arg("--now")
        .arg("tomorrow")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid local datetime"));
}
