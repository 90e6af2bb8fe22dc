use std::process::Command;

use cpx_contracts::{CPX_SUITE_REPORT_SCHEMA_VERSION, CPX_TEST_LIST_SCHEMA_VERSION};

const BIN: &str = env!("CARGO_BIN_EXE_cpx-difftest");

#[test]
fn cli_lists_builtin_tests() {
    let out = Command::new(BIN)
        .arg("--list")
        .arg("--filter")
        .arg("PySys")
        .output()
        .expect("run cpx-difftest");
    assert!(
        out.status.success(),
        "status={}\nstderr={}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse list json");
    assert_eq!(
        v.get("schema_version").and_then(|s| s.as_str()),
        Some(CPX_TEST_LIST_SCHEMA_VERSION)
    );
    let tests = v.get("tests").and_then(|t| t.as_array()).expect("tests array");
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0]["name"], "PySys_GetObject");
    assert_eq!(tests[0]["comparator"], "unhandled_error");
    assert_eq!(tests[0]["probe"]["argspec"], "s");

    let out = Command::new(BIN)
        .arg("--list")
        .arg("--filter")
        .arg("Interpreters")
        .output()
        .expect("run cpx-difftest");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse list json");
    assert_eq!(v["tests"][0]["name"], "Interpreters");
    assert_eq!(v["tests"][0]["comparator"], "unhandled_error");
}

#[test]
fn cli_runs_suite_and_writes_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report_path = dir.path().join("report.json");

    let out = Command::new(BIN)
        .env_remove("CPX_CC_ARGS")
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .arg("--jobs")
        .arg("2")
        .arg("--report-out")
        .arg(&report_path)
        .output()
        .expect("run cpx-difftest");
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let bytes = std::fs::read(&report_path).expect("read report");
    let v: serde_json::Value = serde_json::from_slice(&bytes).expect("parse report json");
    assert_eq!(
        v.get("schema_version").and_then(|s| s.as_str()),
        Some(CPX_SUITE_REPORT_SCHEMA_VERSION)
    );
    assert_eq!(v.get("failed").and_then(|n| n.as_u64()), Some(0));
    assert_eq!(v.get("errors").and_then(|n| n.as_u64()), Some(0));
}

#[test]
fn cli_unknown_filter_is_a_harness_error() {
    let out = Command::new(BIN)
        .arg("--filter")
        .arg("NoSuchProbe")
        .output()
        .expect("run cpx-difftest");
    assert_eq!(out.status.code(), Some(2));
}
