//! CLI integration tests for the ctxvault command-line interface.
//!
//! Every test points `CTXVAULT_DATA_DIR` at its own temporary directory, so
//! the store files and logs never touch the real home directory.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the ctxvault binary bound to `data_dir`.
fn ctxvault(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ctxvault").unwrap();
    cmd.env_remove("CTXVAULT_CONFIG")
        .env_remove("CTXVAULT_DB_PATH")
        .env_remove("RUST_LOG")
        .env("CTXVAULT_DATA_DIR", data_dir)
        .env("CTXVAULT_DB_KIND", "document");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should be JSON")
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    ctxvault(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("agents"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    ctxvault(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ctxvault"));
}

#[test]
fn test_add_rejects_unknown_type() {
    let dir = TempDir::new().unwrap();
    ctxvault(dir.path())
        .args(["add", "some content", "--type", "memo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("memo"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_init_creates_document_store() {
    let dir = TempDir::new().unwrap();
    let output = stdout_json(ctxvault(dir.path()).args(["init", "--json"]));

    assert_eq!(output["backend"], "document");
    assert_eq!(output["agents"], 3);
    assert_eq!(output["contexts"], 1);
    assert_eq!(output["healthy"], true);
    assert!(dir.path().join("context-db.json").exists());
}

#[test]
fn test_add_get_search_delete_flow() {
    let dir = TempDir::new().unwrap();

    let added = stdout_json(ctxvault(dir.path()).args([
        "add",
        "Use SQLite for the team store",
        "--project",
        "/repo",
        "--type",
        "decision",
        "--importance",
        "9",
        "--tag",
        "arch",
        "--json",
    ]));
    let id = added["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let entry = stdout_json(ctxvault(dir.path()).args(["get", &id, "--json"]));
    assert_eq!(entry["projectPath"], "/repo");
    assert_eq!(entry["type"], "decision");
    assert_eq!(entry["importance"], 9);

    let hits = stdout_json(ctxvault(dir.path()).args([
        "search", "sqlite", "--project", "/repo", "--type", "decision", "--json",
    ]));
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], id.as_str());

    ctxvault(dir.path())
        .args(["delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Context deleted"));

    ctxvault(dir.path())
        .args(["get", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("context not found"));
}

#[test]
fn test_search_human_output() {
    let dir = TempDir::new().unwrap();
    ctxvault(dir.path())
        .args(["add", "flaky integration test", "-t", "issue", "-p", "/repo"])
        .assert()
        .success();

    ctxvault(dir.path())
        .args(["search", "flaky"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Contexts"))
        .stdout(predicate::str::contains("flaky integration test"));

    ctxvault(dir.path())
        .args(["search", "nothing-matches-this"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching contexts"));
}

#[test]
fn test_add_rejects_out_of_range_importance() {
    let dir = TempDir::new().unwrap();
    ctxvault(dir.path())
        .args(["add", "too important", "--importance", "11"])
        .assert()
        .failure();
}

#[test]
fn test_stats_counts_by_type() {
    let dir = TempDir::new().unwrap();
    for content in ["first", "second"] {
        ctxvault(dir.path())
            .args(["add", content, "-t", "code", "-p", "/repo"])
            .assert()
            .success();
    }

    let stats = stdout_json(ctxvault(dir.path()).args(["stats", "--project", "/repo", "--json"]));
    assert_eq!(stats["totalContexts"], 2);
    assert_eq!(stats["byType"]["code"], 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_agents_list_and_validate() {
    let dir = TempDir::new().unwrap();
    let agents = stdout_json(ctxvault(dir.path()).args(["agents", "list", "--json"]));
    assert_eq!(agents.as_array().unwrap().len(), 3);

    let report = stdout_json(ctxvault(dir.path()).args(["agents", "validate", "--json"]));
    assert_eq!(report["passed"], true);
}

#[test]
fn test_agents_add_and_delete_custom() {
    let dir = TempDir::new().unwrap();
    let added = stdout_json(ctxvault(dir.path()).args([
        "agents",
        "add",
        "Docs",
        "--description",
        "Writes documentation",
        "--specialization",
        "markdown",
        "--json",
    ]));
    let id = added["id"].as_str().unwrap().to_string();

    ctxvault(dir.path())
        .args(["agents", "add", "Docs", "--description", "Again"])
        .assert()
        .failure();

    ctxvault(dir.path())
        .args(["agents", "delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Agent deleted"));
}

#[test]
fn test_seed_agents_cannot_be_deleted() {
    let dir = TempDir::new().unwrap();
    let agents = stdout_json(ctxvault(dir.path()).args(["agents", "list", "--json"]));
    let seed_id = agents[0]["id"].as_str().unwrap().to_string();

    ctxvault(dir.path())
        .args(["agents", "delete", &seed_id])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration and Transfer
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_migrate_runs_once() {
    let dir = TempDir::new().unwrap();
    let legacy = dir.path().join("contexts.json");
    std::fs::write(
        &legacy,
        r#"[{"id": "old-1", "projectPath": "/repo", "type": "decision",
             "content": "Use X", "timestamp": "2023-05-01T10:00:00Z", "importance": 8}]"#,
    )
    .unwrap();
    let legacy_arg = legacy.to_str().unwrap();

    let first = stdout_json(ctxvault(dir.path()).args(["migrate", "--legacy", legacy_arg, "--json"]));
    assert_eq!(first["status"], "migrated");
    assert_eq!(first["report"]["contextsMigrated"], 1);
    assert!(dir.path().join(".migration-complete").exists());

    let second =
        stdout_json(ctxvault(dir.path()).args(["migrate", "--legacy", legacy_arg, "--json"]));
    assert_eq!(second["status"], "already-completed");

    let entry = stdout_json(ctxvault(dir.path()).args(["get", "old-1", "--json"]));
    assert_eq!(entry["content"], "Use X");
}

#[test]
fn test_migrate_without_legacy_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.json");
    let outcome = stdout_json(ctxvault(dir.path()).args([
        "migrate",
        "--legacy",
        missing.to_str().unwrap(),
        "--json",
    ]));
    assert_eq!(outcome["status"], "no-legacy-data");
}

#[test]
fn test_export_then_import_into_relational_store() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let snapshot = source.path().join("snapshot.json");

    let added = stdout_json(ctxvault(source.path()).args(["add", "exported entry", "--json"]));
    let id = added["id"].as_str().unwrap().to_string();

    ctxvault(source.path())
        .args(["export", "--output", snapshot.to_str().unwrap()])
        .assert()
        .success();
    assert!(snapshot.exists());

    ctxvault(target.path())
        .env("CTXVAULT_DB_KIND", "relational")
        .args(["import", snapshot.to_str().unwrap()])
        .assert()
        .success();

    let entry = stdout_json(
        ctxvault(target.path())
            .env("CTXVAULT_DB_KIND", "relational")
            .args(["get", &id, "--json"]),
    );
    assert_eq!(entry["content"], "exported entry");
    assert!(target.path().join("context.db").exists());
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_check_reports_backend() {
    let dir = TempDir::new().unwrap();
    let output = stdout_json(
        ctxvault(dir.path())
            .env("CTXVAULT_DB_KIND", "hybrid")
            .args(["config", "check", "--json"]),
    );
    assert_eq!(output["valid"], true);
    assert_eq!(output["backend"], "hybrid");
    assert_eq!(output["storagePaths"].as_array().unwrap().len(), 2);
    assert!(!dir.path().join("context.db").exists());
}

#[test]
fn test_config_check_rejects_unknown_kind() {
    let dir = TempDir::new().unwrap();
    ctxvault(dir.path())
        .env("CTXVAULT_DB_KIND", "mongo")
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid"));
}

#[test]
fn test_config_file_selects_backend() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("ctxvault.toml");
    let db_path = dir.path().join("store").join("context.db");
    std::fs::write(
        &config,
        format!(
            "kind = \"embedded-relational\"\n\n[relational]\npath = {:?}\n",
            db_path.to_str().unwrap()
        ),
    )
    .unwrap();

    let output = stdout_json(ctxvault(dir.path()).args([
        "--config",
        config.to_str().unwrap(),
        "init",
        "--json",
    ]));
    assert_eq!(output["backend"], "embedded-relational");
    assert!(db_path.exists());
}
