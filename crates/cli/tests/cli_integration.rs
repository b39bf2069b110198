//! CLI integration tests for the calculation and ledger subcommands.
//!
//! Uses `assert_cmd` to spawn the `mrv` binary and verify exit codes,
//! stdout content, and stderr content. Every test runs in its own
//! temporary directory, so the default ledger and data directory land
//! there.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Helper: create a Command for the `mrv` binary, rooted at `dir`.
fn mrv(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("mrv");
    cmd.current_dir(dir.path());
    cmd.env_remove("MRV_LOG");
    cmd
}

fn run_request(dir: &TempDir) -> serde_json::Value {
    let output = mrv(dir)
        .args(["--output", "json", "run"])
        .arg(fixture("request.json"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

fn request_with(dir: &TempDir, name: &str, edit: impl FnOnce(&mut serde_json::Value)) -> PathBuf {
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fixture("request.json")).unwrap()).unwrap();
    edit(&mut value);
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let tmp = TempDir::new().unwrap();
    mrv(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MRV calculation and audit engine"));
}

#[test]
fn version_exits_0() {
    let tmp = TempDir::new().unwrap();
    mrv(&tmp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mrv"));
}

// ──────────────────────────────────────────────
// 2. Run
// ──────────────────────────────────────────────

#[test]
fn run_records_snapshot_and_prints_hashes() {
    let tmp = TempDir::new().unwrap();
    let summary = run_request(&tmp);
    assert_eq!(summary["snapshot_id"], 1);
    assert_eq!(summary["subject"], "P-2025/F1");
    assert_eq!(summary["facility_tco2e"], "111156.5");
    assert_eq!(summary["compliance_status"], "pass");
    assert_eq!(summary["locked"], false);
    assert_eq!(summary["input_hash"].as_str().unwrap().len(), 64);
    assert_eq!(summary["result_hash"].as_str().unwrap().len(), 64);

    assert!(tmp.path().join("mrv-ledger.json").exists());
    assert!(tmp.path().join("mrv-data/factors.json").exists());
    for sha in summary["datasets"].as_array().unwrap() {
        let file = format!("mrv-data/datasets/{}.json", sha.as_str().unwrap());
        assert!(tmp.path().join(file).exists());
    }
}

#[test]
fn run_text_output_names_the_snapshot() {
    let tmp = TempDir::new().unwrap();
    mrv(&tmp)
        .arg("run")
        .arg(fixture("request.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot 1 (P-2025/F1)"))
        .stdout(predicate::str::contains("facility_tco2e: 111156.5"));
}

#[test]
fn same_request_gives_same_hashes() {
    let a = run_request(&TempDir::new().unwrap());
    let b = run_request(&TempDir::new().unwrap());
    assert_eq!(a["input_hash"], b["input_hash"]);
    assert_eq!(a["result_hash"], b["result_hash"]);
}

#[test]
fn run_with_toml_config_changes_the_input_hash() {
    let tmp = TempDir::new().unwrap();
    let plain = run_request(&tmp);
    let output = mrv(&tmp)
        .args(["--output", "json", "run"])
        .arg(fixture("request.json"))
        .arg("--config")
        .arg(fixture("engine.toml"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let configured: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_ne!(plain["input_hash"], configured["input_hash"]);
    assert_eq!(configured["previous_snapshot_hash"], plain["snapshot_hash"]);
}

#[test]
fn input_error_exits_1_and_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    let request = request_with(&tmp, "zero.json", |v| {
        v["activity"]["production"] = serde_json::json!([
            { "facility_id": "F1", "product_code": "A", "quantity": "0", "unit": "t" }
        ]);
        v["activity"]["exports"] = serde_json::json!([]);
    });
    mrv(&tmp)
        .arg("run")
        .arg(&request)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error: production total is 0"));
    assert!(!tmp.path().join("mrv-ledger.json").exists());

    mrv(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no snapshots"));
}

#[test]
fn missing_factor_error_names_the_field() {
    let tmp = TempDir::new().unwrap();
    let request = request_with(&tmp, "no-ef.json", |v| {
        v["factors"].as_array_mut().unwrap().remove(1);
    });
    mrv(&tmp)
        .arg("run")
        .arg(&request)
        .assert()
        .failure()
        .stderr(predicate::str::contains("fuel[0].ef"));
}

#[test]
fn missing_request_file_reports_json_error() {
    let tmp = TempDir::new().unwrap();
    mrv(&tmp)
        .args(["--output", "json", "run", "nope.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("file not found"));
}

// ──────────────────────────────────────────────
// 3. Ledger
// ──────────────────────────────────────────────

#[test]
fn list_filters_by_project() {
    let tmp = TempDir::new().unwrap();
    run_request(&tmp);
    mrv(&tmp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("P-2025/F1"))
        .stdout(predicate::str::contains("draft"));
    mrv(&tmp)
        .args(["list", "--project", "OTHER"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no snapshots"));
}

#[test]
fn locked_snapshot_cannot_be_deleted() {
    let tmp = TempDir::new().unwrap();
    run_request(&tmp);
    mrv(&tmp)
        .args(["lock", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("locked snapshot 1"));
    mrv(&tmp)
        .args(["delete", "1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("snapshot 1 is locked"));
}

#[test]
fn draft_snapshot_can_be_deleted() {
    let tmp = TempDir::new().unwrap();
    run_request(&tmp);
    mrv(&tmp).args(["delete", "1"]).assert().success();
    mrv(&tmp)
        .args(["lock", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("snapshot not found: 1"));
}

#[test]
fn reruns_form_an_intact_chain() {
    let tmp = TempDir::new().unwrap();
    let first = run_request(&tmp);
    let second = run_request(&tmp);
    assert_eq!(second["snapshot_id"], 2);
    assert_eq!(second["previous_snapshot_hash"], first["snapshot_hash"]);
    mrv(&tmp)
        .args(["chain", "P-2025", "F1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("intact (2 snapshots"));
}

// ──────────────────────────────────────────────
// 4. Replay and check
// ──────────────────────────────────────────────

#[test]
fn replay_of_locked_snapshot_passes() {
    let tmp = TempDir::new().unwrap();
    mrv(&tmp)
        .arg("run")
        .arg(fixture("request.json"))
        .arg("--lock")
        .assert()
        .success();
    mrv(&tmp)
        .args(["replay", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS"))
        .stdout(predicate::str::contains("MISMATCH").not());
}

#[test]
fn replay_with_drifted_factor_fails() {
    let tmp = TempDir::new().unwrap();
    run_request(&tmp);
    let recorded = fs::read_to_string(tmp.path().join("mrv-data/factors.json")).unwrap();
    let mut factors: serde_json::Value = serde_json::from_str(&recorded).unwrap();
    for f in factors.as_array_mut().unwrap() {
        if f["kind"] == "ef" {
            f["value"] = serde_json::json!("56.2");
        }
    }
    let drifted = tmp.path().join("drifted.json");
    fs::write(&drifted, factors.to_string()).unwrap();

    mrv(&tmp)
        .args(["replay", "1", "--factors"])
        .arg(&drifted)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("FAIL"))
        .stdout(predicate::str::contains("MISMATCH"))
        .stderr(predicate::str::contains("does not match"));
}

#[test]
fn replay_without_datasets_is_an_error() {
    let tmp = TempDir::new().unwrap();
    run_request(&tmp);
    fs::remove_dir_all(tmp.path().join("mrv-data/datasets")).unwrap();
    mrv(&tmp)
        .args(["replay", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not available"));
}

#[test]
fn check_reevaluates_recorded_compliance() {
    let tmp = TempDir::new().unwrap();
    run_request(&tmp);
    let output = mrv(&tmp)
        .args(["--output", "json", "check", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "pass");
    assert_eq!(report["matches_recorded"], true);
    assert!(!report["checks"].as_array().unwrap().is_empty());
}

#[test]
fn check_fails_without_monitoring_plan() {
    let tmp = TempDir::new().unwrap();
    let request = request_with(&tmp, "no-plan.json", |v| {
        v.as_object_mut().unwrap().remove("monitoring_plan");
    });
    mrv(&tmp).arg("run").arg(&request).assert().success();
    mrv(&tmp)
        .args(["check", "1"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("[fail]"))
        .stderr(predicate::str::contains("fails compliance"));
}

#[test]
fn quiet_suppresses_output() {
    let tmp = TempDir::new().unwrap();
    mrv(&tmp)
        .args(["--quiet", "run"])
        .arg(fixture("request.json"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
