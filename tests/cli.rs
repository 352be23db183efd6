use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{TempDir, tempdir};

/// `rsx` isolated under `dir`: project root, state db, and user config dir.
fn rsx(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rsx").unwrap();
    cmd.env_clear()
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("RSX_DATA_DIR", dir.join("data"))
        .arg("--root")
        .arg(dir.join("project"));
    cmd
}

fn json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn workspace() -> TempDir {
    tempdir().unwrap()
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("rsx").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("breakers"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("rsx").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_breakers_json_lists_known_dependencies() {
    let dir = workspace();
    let value = json(rsx(dir.path()).args(["--json", "breakers"]));

    assert_eq!(value["status"], "ok");
    let breakers = value["data"].as_array().unwrap();
    let ids: Vec<&str> = breakers
        .iter()
        .map(|b| b["dependency"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"database"));
    assert!(ids.contains(&"embedding_api"));
    assert!(breakers.iter().all(|b| b["state"] == "closed"));
}

#[test]
fn test_unknown_breaker_is_structured_error() {
    let dir = workspace();
    let output = rsx(dir.path())
        .args(["--json", "breakers", "payments"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"]["error"]["code"], "UNKNOWN_DEPENDENCY");
    assert!(value["status"]["error"]["suggestion"]
        .as_str()
        .unwrap()
        .contains("known_dependencies"));
}

#[test]
fn test_unknown_breaker_human_error_on_stderr() {
    let dir = workspace();
    rsx(dir.path())
        .args(["--plain", "breakers", "payments"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E105"));
}

#[test]
fn test_query_plans_hybrid_sql() {
    let dir = workspace();
    let value = json(rsx(dir.path()).args([
        "--json",
        "query",
        "\"circuit breaker\" rust",
        "--field",
        "title:A",
        "--field",
        "body:B",
    ]));

    let data = &value["data"];
    assert_eq!(data["mode"], "hybrid");
    assert_eq!(data["embedding_source"], "fresh");
    let sql = data["query"]["sql"].as_str().unwrap();
    assert!(sql.contains("setweight"));
    assert!(sql.contains("<=>"));
}

#[test]
fn test_query_without_embedder_degrades() {
    let dir = workspace();
    let value = json(
        rsx(dir.path())
            .env("RSX_EMBEDDING_BACKEND", "none")
            .args(["--json", "query", "rust"]),
    );

    assert_eq!(value["data"]["mode"], "lexical_only");
    assert!(value["data"]["degradation"]["title"].is_string());
}

#[test]
fn test_config_set_then_get() {
    let dir = workspace();
    rsx(dir.path())
        .args(["config", "breaker.defaults.failure_threshold", "2"])
        .assert()
        .success();

    let value = json(rsx(dir.path()).args(["--json", "config", "breaker.defaults.failure_threshold"]));
    assert_eq!(value["data"]["value"], 2);

    rsx(dir.path())
        .args(["config", "--unset", "breaker.defaults.failure_threshold"])
        .assert()
        .success();
    let value = json(rsx(dir.path()).args(["--json", "config", "breaker.defaults.failure_threshold"]));
    assert_eq!(value["data"]["value"], 5);
}

#[test]
fn test_config_rejects_invalid_values() {
    let dir = workspace();
    rsx(dir.path())
        .args(["config", "search.hybrid.text_weight", "0.9"])
        .assert()
        .failure();
    assert!(!dir.path().join("project").join("config.toml").exists());
}

#[test]
fn test_tripped_breaker_shows_in_status_until_reset() {
    let dir = workspace();
    let degrade = |dir: &Path| {
        rsx(dir)
            .env("RSX_EMBEDDING_BACKEND", "none")
            .env("RSX_BREAKER_FAILURE_THRESHOLD", "1")
            .args(["--json", "query", "rust"])
            .assert()
            .success();
    };
    degrade(dir.path());

    let status = json(rsx(dir.path()).args(["--json", "status"]));
    assert_eq!(status["data"]["status"], "degraded");
    assert_eq!(status["data"]["total_issues"], 1);

    let breaker = json(rsx(dir.path()).args(["--json", "breakers", "embedding_api", "--metrics"]));
    assert_eq!(breaker["data"][0]["state"], "open");
    assert_eq!(breaker["data"][0]["recent_calls"][0]["result"], "failure");

    rsx(dir.path())
        .args(["breakers", "--reset", "embedding_api"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reset embedding_api"));

    let status = json(rsx(dir.path()).args(["--json", "status"]));
    assert_eq!(status["data"]["status"], "operational");
}

#[test]
fn test_health_reports_store_check() {
    let dir = workspace();
    let value = json(rsx(dir.path()).args(["--json", "health"]));
    assert!(value["data"]["checks"]["database"]["status"].is_string());
    assert!(value["data"]["overall"].is_string());
}
