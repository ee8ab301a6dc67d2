//! Integration tests for the walkcoin binary.
//!
//! These tests verify end-to-end behavior including:
//! - Trace replay, crediting and journaling
//! - Settings persistence
//! - CSV rollup and daily stats

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("walkcoin"));
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .arg("--data-dir")
        .arg(temp_dir.path().join("data"));
    cmd
}

fn data_path(temp_dir: &TempDir, name: &str) -> PathBuf {
    temp_dir.path().join("data").join(name)
}

/// Trace of a walk north in 50 m legs with no accelerometer
fn write_gps_trace(dir: &Path, legs: usize) -> PathBuf {
    let deg_per_m = 180.0 / (std::f64::consts::PI * EARTH_RADIUS_M);
    let mut lines = vec![r#"{"kind":"motion_unavailable","timestamp_ms":0}"#.to_string()];
    for i in 0..=legs {
        let fix = serde_json::json!({
            "kind": "fix",
            "latitude": 45.0 + (i as f64) * 50.0 * deg_per_m,
            "longitude": 16.0,
            "accuracy_m": 5.0,
            "timestamp_ms": 1000 * i as u64,
        });
        lines.push(fix.to_string());
    }
    let path = dir.join("walk.jsonl");
    fs::write(&path, lines.join("\n")).expect("Failed to write trace");
    path
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("walkcoin"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("walk rewards"));
}

#[test]
fn test_track_credits_and_journals() {
    let temp_dir = setup_test_dir();
    let trace = write_gps_trace(temp_dir.path(), 20);

    cli(&temp_dir)
        .arg("track")
        .arg("--trace")
        .arg(&trace)
        .arg("--referrals")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains("Level up! Reached level 2"))
        .stdout(predicate::str::contains("1312 estimated"))
        .stdout(predicate::str::contains("Coins:     800 (10 credits)"))
        .stdout(predicate::str::contains("Tier:      medium"))
        .stdout(predicate::str::contains("Session recorded"));

    let profile: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(data_path(&temp_dir, "profile.json")).unwrap())
            .unwrap();
    assert_eq!(profile["total_coins"], 800);
    assert_eq!(profile["current_level"], 2);
    assert_eq!(profile["referral_count"], 2);

    let transactions = fs::read_to_string(data_path(&temp_dir, "transactions.jsonl")).unwrap();
    assert_eq!(transactions.lines().count(), 21);
    assert_eq!(transactions.matches("\"level_up\"").count(), 1);

    let journal = fs::read_to_string(data_path(&temp_dir, "wal/sessions.wal")).unwrap();
    assert_eq!(journal.lines().count(), 1);
    assert!(journal.contains("\"coins\":800"));
}

#[test]
fn test_second_session_builds_on_profile() {
    let temp_dir = setup_test_dir();
    let trace = write_gps_trace(temp_dir.path(), 20);

    for _ in 0..2 {
        cli(&temp_dir)
            .arg("track")
            .arg("--trace")
            .arg(&trace)
            .assert()
            .success();
    }

    // 100 base + 500 level bonus per session, levels 2 then 3
    cli(&temp_dir)
        .arg("ledger")
        .assert()
        .success()
        .stdout(predicate::str::contains("Coins:     1200"))
        .stdout(predicate::str::contains("Level:     3"))
        .stdout(predicate::str::contains("Distance:  2.00 km"));
}

#[test]
fn test_dry_run_records_nothing() {
    let temp_dir = setup_test_dir();
    let trace = write_gps_trace(temp_dir.path(), 4);

    cli(&temp_dir)
        .arg("track")
        .arg("--trace")
        .arg(&trace)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Coins:     20"))
        .stdout(predicate::str::contains("dry run"));

    assert!(!data_path(&temp_dir, "profile.json").exists());
    assert!(!data_path(&temp_dir, "transactions.jsonl").exists());
    assert!(!data_path(&temp_dir, "wal/sessions.wal").exists());
}

#[test]
fn test_empty_trace_fails() {
    let temp_dir = setup_test_dir();
    let trace = temp_dir.path().join("empty.jsonl");
    fs::write(&trace, "\n").unwrap();

    cli(&temp_dir)
        .arg("track")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .failure();
}

#[test]
fn test_settings_set_and_show() {
    let temp_dir = setup_test_dir();

    cli(&temp_dir)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Height:    170 cm"))
        .stdout(predicate::str::contains("Stride:    0.762 m"));

    cli(&temp_dir)
        .args(["settings", "set", "--height", "180", "--sound", "on"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stride:    0.743 m"))
        .stdout(predicate::str::contains("Sound:     on"));

    cli(&temp_dir)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Height:    180 cm"))
        .stdout(predicate::str::contains("Vibration: on"));
}

#[test]
fn test_settings_reject_bad_stride() {
    let temp_dir = setup_test_dir();

    cli(&temp_dir)
        .args(["settings", "set", "--stride", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stride length must be positive"));

    assert!(!data_path(&temp_dir, "settings.json").exists());
}

#[test]
fn test_longer_stride_counts_fewer_steps() {
    let temp_dir = setup_test_dir();
    let trace = write_gps_trace(temp_dir.path(), 20);

    cli(&temp_dir)
        .args(["settings", "set", "--stride", "0.9"])
        .assert()
        .success();

    cli(&temp_dir)
        .arg("track")
        .arg("--trace")
        .arg(&trace)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("1111 estimated"));
}

#[test]
fn test_rollup_and_stats() {
    let temp_dir = setup_test_dir();
    let trace = write_gps_trace(temp_dir.path(), 4);

    cli(&temp_dir)
        .arg("track")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .success();

    cli(&temp_dir)
        .args(["rollup", "--cleanup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 1 sessions"))
        .stdout(predicate::str::contains("Cleaned up 1 processed journal files"));

    assert!(data_path(&temp_dir, "sessions.csv").exists());
    assert!(!data_path(&temp_dir, "wal/sessions.wal").exists());
    let archives = fs::read_dir(data_path(&temp_dir, "wal"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".processed"))
        .count();
    assert_eq!(archives, 0);

    cli(&temp_dir)
        .arg("track")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .success();

    // One archived and one journaled session today
    cli(&temp_dir)
        .args(["stats", "--days", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("40 coins"))
        .stdout(predicate::str::contains("2 session(s)"));
}

#[test]
fn test_stats_without_sessions() {
    let temp_dir = setup_test_dir();

    cli(&temp_dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("No walks in the last 7 days"));
}

#[test]
fn test_rollup_with_empty_journal() {
    let temp_dir = setup_test_dir();

    cli(&temp_dir)
        .arg("rollup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 0 sessions"));
}
