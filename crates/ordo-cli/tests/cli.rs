//! End-to-end runs of the `ordo` binary.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

use ordo_store::Store;
use ordo_types::{AuditContext, extract_timestamp_str};

fn ordo_binary_path() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_ordo"))
}

fn ordo(args: &[&str]) -> Output {
    Command::new(ordo_binary_path())
        .args(args)
        .env_remove("ORDO_DATABASE")
        .env_remove("ORDO_BUSY_TIMEOUT_MS")
        .env_remove("ORDO_ID_MODE")
        .env_remove("RUST_LOG")
        .output()
        .expect("run ordo")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_id_prints_requested_count_of_v7_ids() {
    let output = ordo(&["id", "--precise", "-n", "3"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 3);
    for line in &lines {
        assert!(extract_timestamp_str(line).is_ok(), "not a v7 id: {line}");
    }
}

#[test]
fn test_ts_prints_embedded_millis() {
    let output = ordo(&["ts", "017f22e2-79b0-7cc3-98c4-dc0c0c07398f"]);
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output),
        ["017f22e2-79b0-7cc3-98c4-dc0c0c07398f\t1645557742000"]
    );
}

#[test]
fn test_ts_fails_on_v4_id_but_reports_the_rest() {
    let output = ordo(&[
        "ts",
        "550e8400-e29b-41d4-a716-446655440000",
        "017f22e2-79b0-7cc3-98c4-dc0c0c07398f",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_lines(&output).len(), 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("550e8400"));
}

#[test]
fn test_history_on_missing_database_fails_without_creating_it() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("typo.db");

    let output = ordo(&[
        "--database",
        path.to_str().expect("utf-8 path"),
        "history",
        "018bcfe5-6800-7a3c-9e1f-2f4d6c0b9a11",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!path.exists());
}

#[test]
fn test_history_prints_json_lines_in_mutation_order() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("orders.db");
    let id = {
        let store = Store::open(&path).expect("open store");
        let ctx = AuditContext::new("amy");
        let created = store
            .create("orders", serde_json::json!({"status": "pending"}), &ctx)
            .expect("create");
        store
            .update(
                "orders",
                created.id,
                1,
                |order: &mut Value| order["status"] = "paid".into(),
                &ctx,
            )
            .expect("update");
        created.id
    };

    let output = ordo(&[
        "--database",
        path.to_str().expect("utf-8 path"),
        "history",
        &id.to_string(),
    ]);
    assert!(output.status.success());

    let entries: Vec<Value> = stdout_lines(&output)
        .iter()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "CREATED");
    assert_eq!(entries[1]["action"], "UPDATED");
    assert_eq!(entries[1]["changed_by"], "amy");
    assert_eq!(entries[1]["record_id"], id.to_string());

    let output = ordo(&[
        "--database",
        path.to_str().expect("utf-8 path"),
        "table-history",
        "orders",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output).len(), 2);
}
