// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end runs of the `fs-harness` binary without a kcov device.

use assert_cmd::cargo::cargo_bin_cmd;
use harness_core::{parse_trace, TraceRow};
use std::path::Path;

fn write_workload(dir: &Path, ops: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("workload.json");
    std::fs::write(&path, serde_json::json!({ "ops": ops }).to_string()).unwrap();
    path
}

fn harness(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fs-harness");
    cmd.current_dir(dir)
        .env_remove("FS_HARNESS_CONFIG")
        .env_remove("FS_HARNESS_TRACE_OUTPUT")
        .env_remove("FS_HARNESS_WORKLOAD")
        .arg("--coverage-device")
        .arg(dir.join("no-kcov"));
    cmd
}

fn read_trace(path: &Path) -> Vec<TraceRow> {
    parse_trace(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn replays_workload_and_writes_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let workload = write_workload(
        tmp.path(),
        serde_json::json!([
            { "MkDir": { "path": "/a", "mode": 493 } },
            { "Create": { "path": "/a/f.txt", "mode": ["S_IRUSR", "S_IWUSR", "S_IRGRP", "S_IROTH"] } },
            { "Remove": { "path": "/a" } }
        ]),
    );

    let output = harness(tmp.path())
        .arg("ws")
        .arg("--workload")
        .arg(&workload)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();

    let trace_path = tmp.path().join("trace.csv");
    let expected = format!(
        "==> trace dump saved at '{}'",
        std::fs::canonicalize(&trace_path).unwrap().display()
    );
    assert!(
        stdout.lines().any(|l| l == expected),
        "missing trace location in {stdout:?}"
    );
    assert_eq!(stdout.lines().last(), Some("#SUCCESS: 3 | #FAILURE: 0"));

    let rows = read_trace(&trace_path);
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0],
        TraceRow {
            index: 1,
            command: "MKDIR".into(),
            return_code: 0,
            errno: "Success(0)".into(),
        }
    );
    assert_eq!(rows[1].command, "CREATE");
    assert!(rows[1].return_code >= 0);
    assert_eq!(rows[2].command, "RMDIR");
    assert_eq!(rows[2].return_code, 0);

    assert!(tmp.path().join("ws").is_dir());
    assert!(!tmp.path().join("ws/a").exists());
}

#[test]
fn missing_target_is_recorded_as_stat_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let workload = write_workload(
        tmp.path(),
        serde_json::json!([
            { "Remove": { "path": "/ghost" } },
            { "MkDir": { "path": "/after", "mode": 448 } }
        ]),
    );

    harness(tmp.path())
        .arg("ws")
        .arg("--workload")
        .arg(&workload)
        .assert()
        .success();

    let rows = read_trace(&tmp.path().join("trace.csv"));
    assert_eq!(
        rows[0],
        TraceRow {
            index: 1,
            command: "STAT".into(),
            return_code: -1,
            errno: "No such file or directory(2)".into(),
        }
    );
    assert_eq!(rows[1].index, 2);
    assert_eq!(rows[1].command, "MKDIR");
}

#[test]
fn malformed_path_aborts_without_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let workload = write_workload(
        tmp.path(),
        serde_json::json!([
            { "MkDir": { "path": "/ok", "mode": 493 } },
            { "Create": { "path": "no-slash", "mode": 420 } }
        ]),
    );

    harness(tmp.path())
        .arg("ws")
        .arg("--workload")
        .arg(&workload)
        .assert()
        .code(1);

    assert!(!tmp.path().join("trace.csv").exists());
    assert!(tmp.path().join("ws/ok").is_dir());
}

#[test]
fn existing_sandbox_is_reused() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("ws")).unwrap();
    std::fs::write(tmp.path().join("ws/keep"), b"data").unwrap();

    let output = harness(tmp.path())
        .arg("ws")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert!(String::from_utf8(output)
        .unwrap()
        .ends_with("#SUCCESS: 0 | #FAILURE: 0\n"));
    assert!(tmp.path().join("ws/keep").exists());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("trace.csv")).unwrap(),
        "Index,Command,ReturnCode,Errno\n"
    );
}

#[test]
fn config_file_selects_trace_output() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("fs-harness.toml");
    std::fs::write(
        &config,
        "[coverage]\nenabled = false\n\n[trace]\noutput = \"out/run.csv\"\n",
    )
    .unwrap();
    std::fs::create_dir(tmp.path().join("out")).unwrap();

    harness(tmp.path())
        .arg("ws")
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    assert!(tmp.path().join("out/run.csv").exists());
    assert!(!tmp.path().join("trace.csv").exists());
}

#[test]
fn coverage_output_file_is_created() {
    let tmp = tempfile::tempdir().unwrap();

    harness(tmp.path())
        .arg("ws")
        .arg("--coverage-output")
        .arg("cover.txt")
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(tmp.path().join("cover.txt")).unwrap(),
        ""
    );
}

#[test]
fn invalid_config_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("bad.toml");
    std::fs::write(&config, "[coverage]\ncover-size = \"lots\"\n").unwrap();

    harness(tmp.path())
        .arg("ws")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1);

    assert!(!tmp.path().join("ws").exists());
}

#[test]
fn missing_sandbox_argument_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("fs-harness");
    cmd.current_dir(tmp.path()).assert().failure();
}
