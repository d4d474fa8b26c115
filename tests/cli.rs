// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Command-line behavior against the bundled demo pipeline

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn demo() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/ml-pipeline.yaml")
}

fn dagflow(state: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dagflow").unwrap();
    cmd.current_dir(state.path())
        .env("NO_COLOR", "1")
        .env("DAGFLOW_STATE_DIR", state.path().join("state"))
        .env("DAGFLOW_WORKERS", "2")
        .env_remove("DAGFLOW_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn submitted_run_id(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .find(|l| l.contains("Submitted run"))
        .and_then(|l| l.split_whitespace().last())
        .map(str::to_string)
        .expect("no run id in output")
}

#[test]
fn test_validate_demo() {
    let state = TempDir::new().unwrap();
    dagflow(&state)
        .arg("validate")
        .arg(demo())
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline is valid"));
}

#[test]
fn test_validate_reports_type_mismatch() {
    let state = TempDir::new().unwrap();
    let pipeline = state.path().join("broken.yaml");
    std::fs::write(
        &pipeline,
        r#"
name: broken
components:
  - name: produce
    outputs: [{ name: model, type: model }]
    body: { type: shell, command: "true" }
  - name: consume
    inputs: [{ name: data, type: dataset }]
    body: { type: shell, command: "true" }
tasks:
  - name: produce
    component: produce
  - name: consume
    component: consume
    inputs:
      data: { task: produce, output: model }
"#,
    )
    .unwrap();

    dagflow(&state)
        .arg("validate")
        .arg(&pipeline)
        .assert()
        .failure()
        .stdout(predicate::str::contains("consume"));
}

#[test]
fn test_compile_is_deterministic() {
    let state = TempDir::new().unwrap();
    let first = dagflow(&state).arg("compile").arg(demo()).output().unwrap();
    let second = dagflow(&state).arg("compile").arg(demo()).output().unwrap();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    assert!(String::from_utf8_lossy(&first.stdout).contains("dagflow/v1"));
}

#[test]
fn test_compile_to_file_and_graph_it() {
    let state = TempDir::new().unwrap();
    let manifest = state.path().join("manifest.json");
    dagflow(&state)
        .arg("compile")
        .arg(demo())
        .arg("-o")
        .arg(&manifest)
        .assert()
        .success();

    let loaded = dagflow::Manifest::from_file(&manifest).unwrap();
    assert_eq!(loaded.name(), "ml-pipeline");
    assert_eq!(loaded.nodes.len(), 4);

    dagflow(&state)
        .args(["graph", "-f", "mermaid", "-m"])
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("graph TD"))
        .stdout(predicate::str::contains("validate --> deploy"));
}

#[test]
fn test_run_deploys_accurate_model() {
    let state = TempDir::new().unwrap();
    let output = dagflow(&state)
        .arg("run")
        .arg(demo())
        .args(["-p", "simulated_accuracy=0.85"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status:   succeeded"))
        .stdout(predicate::str::contains("deploy succeeded"))
        .get_output()
        .stdout
        .clone();
    let run_id = submitted_run_id(&output);

    dagflow(&state)
        .args(["status", &run_id, "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"succeeded\""));

    dagflow(&state)
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("ml-pipeline-run"))
        .stdout(predicate::str::contains("4/4 succeeded"));
}

#[test]
fn test_run_skips_deploy_for_inaccurate_model() {
    let state = TempDir::new().unwrap();
    dagflow(&state)
        .arg("run")
        .arg(demo())
        .args(["-p", "simulated_accuracy=0.5", "-e", "tuning", "-n", "low-accuracy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status:   succeeded"))
        .stdout(predicate::str::contains("deploy skipped"))
        .stdout(predicate::str::contains("validate succeeded"));

    dagflow(&state)
        .args(["runs", "-e", "tuning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("low-accuracy"))
        .stdout(predicate::str::contains("3/4 succeeded"));
}

#[test]
fn test_run_rejects_unknown_parameter() {
    let state = TempDir::new().unwrap();
    dagflow(&state)
        .arg("run")
        .arg(demo())
        .args(["-p", "learning_rate=0.1"])
        .assert()
        .failure();
}

#[test]
fn test_status_of_unknown_run() {
    let state = TempDir::new().unwrap();
    dagflow(&state).args(["status", "missing-run"]).assert().failure();
}

#[test]
fn test_stored_manifest_can_be_run_by_reference() {
    let state = TempDir::new().unwrap();
    let compiled = dagflow(&state)
        .arg("compile")
        .arg(demo())
        .arg("--store")
        .assert()
        .success()
        .get_output()
        .stderr
        .clone();
    let digest = String::from_utf8_lossy(&compiled)
        .lines()
        .find(|l| l.contains("Stored manifest"))
        .and_then(|l| l.split_whitespace().last())
        .map(str::to_string)
        .unwrap();

    dagflow(&state)
        .args(["manifests", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(digest.as_str()));

    dagflow(&state)
        .args(["run", "--ref", &digest])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status:   succeeded"));
}
