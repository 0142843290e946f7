use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// A sim-source config with short dwell times so a full cycle fits in a
// fraction of a second of wall time. The ramp can never converge onto the
// 300 F setpoint within max_ramp_s, so every run ends Faulted quickly and
// deterministically.
fn write_fast_config(dir: &tempfile::TempDir) -> PathBuf {
    let state_dir = dir.path().join("state");
    let toml = format!(
        r#"
line_id = "line-a"

[detector]
sampling_period_s = 0.05
t_sp_sustain_s = 0.0
t_stable_s = 0.05
max_ramp_s = 0.5
max_stage_s = 1.0

[zones]
preheat = true
main = false
rib = false

[io]
state_dir = {state_dir:?}

[io.source]
kind = "simulated"
setpoint_f = 300.0
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
fn help_prints_usage() {
    let mut cmd = Command::cargo_bin("monitor_cli").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[rstest]
fn self_check_accepts_a_valid_config() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let mut cmd = Command::cargo_bin("monitor_cli").unwrap();
    cmd.arg("self-check").arg("--config").arg(&cfg);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("configuration OK: line line-a"));
}

#[rstest]
fn status_without_state_reports_none() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let mut cmd = Command::cargo_bin("monitor_cli").unwrap();
    cmd.arg("status").arg("--config").arg(&cfg);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("no runtime state for line line-a"));
}

#[rstest]
fn abort_without_state_reports_none() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let mut cmd = Command::cargo_bin("monitor_cli").unwrap();
    cmd.arg("abort").arg("--config").arg(&cfg).arg("--reason").arg("test");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("no runtime state"));
}

#[rstest]
fn bounded_run_completes_and_leaves_inspectable_state() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    // the ramp times out within ~15 ticks; 40 leaves ample slack
    let mut cmd = Command::cargo_bin("monitor_cli").unwrap();
    cmd.arg("run").arg("--config").arg(&cfg).arg("--ticks").arg("40");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("closed: Faulted"));

    // the run closed and no second setpoint step arrives, so the persisted
    // state shows an idle line
    let mut cmd = Command::cargo_bin("monitor_cli").unwrap();
    cmd.arg("status").arg("--config").arg(&cfg);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("line line-a"))
        .stdout(predicate::str::contains("no run open"))
        .stdout(predicate::str::contains("preheat"));
}
