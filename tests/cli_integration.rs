//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary to test.
fn obsflow() -> Command {
    Command::cargo_bin("obsflow").unwrap()
}

/// Binary pointed at `config` inside `dir`, isolated from the user's config.
fn obsflow_in(dir: &assert_fs::TempDir, config: &str) -> Command {
    let file = dir.child("obsflow.toml");
    file.write_str(config).unwrap();

    let mut cmd = obsflow();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("OBSFLOW_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(file.path());
    cmd
}

const PIPELINE_CONFIG: &str = r#"
[scheduler]
interval_ms = 1

[[instances]]
id = "ingest"
plugin = "input:HTTP Endpoint"
config = { batch_size = 1, format = "auto" }

[[instances]]
id = "parse"
plugin = "processing:JSON Parser"
config = { source_field = "data" }

[[pipelines]]
name = "api"
inputs = ["ingest"]
processors = ["parse"]
"#;

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    obsflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plugin pipeline core"));
}

#[test]
fn test_version_flag() {
    obsflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand_fails() {
    obsflow().arg("frobnicate").assert().failure();
}

// ============================================================================
// Plugins Command Tests
// ============================================================================

#[test]
fn test_plugins_list_shows_builtins() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["plugins", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("input:HTTP Endpoint"))
        .stdout(predicate::str::contains("processing:JSON Parser"))
        .stdout(predicate::str::contains("output:Webhook"))
        .stdout(predicate::str::contains("alert:Slack Notifications"))
        .stdout(predicate::str::contains("Total: 4 plugin(s)"));
}

#[test]
fn test_plugins_list_json() {
    let dir = assert_fs::TempDir::new().unwrap();
    let output = obsflow_in(&dir, "").args(["plugins", "list", "-f", "json"]).output().unwrap();
    assert!(output.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> =
        listing.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(
        ids,
        vec![
            "input:HTTP Endpoint",
            "processing:JSON Parser",
            "output:Webhook",
            "alert:Slack Notifications"
        ]
    );
}

#[test]
fn test_plugins_list_by_category() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["plugins", "list", "--category", "output"])
        .assert()
        .success()
        .stdout(predicate::str::contains("output:Webhook"))
        .stdout(predicate::str::contains("input:").not());
}

#[test]
fn test_plugins_list_unknown_category() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["plugins", "list", "--category", "storage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category 'storage'"));
}

#[test]
fn test_plugins_list_without_builtins() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "[general]\nbuiltins = false\n")
        .args(["plugins", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins registered."));
}

#[test]
fn test_plugins_schema() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["plugins", "schema", "alert:Slack Notifications"])
        .assert()
        .success()
        .stdout(predicate::str::contains("webhook_url"))
        .stdout(predicate::str::contains("\"secret\""));
}

#[test]
fn test_plugins_schema_unknown_plugin() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["plugins", "schema", "output:Kafka"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plugin output:Kafka not found"));
}

#[test]
fn test_plugins_discover() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("plugins/edge/plugin.toml")
        .write_str("[plugin]\nname = \"edge\"\nversion = \"1.0.0\"\nimplementation = \"json_parser\"\n")
        .unwrap();
    dir.child("plugins/broken/plugin.toml")
        .write_str("[plugin]\nname = \"broken\"\nversion = \"1.0.0\"\nimplementation = \"kafka\"\n")
        .unwrap();
    dir.child("plugins/_ignored/plugin.toml").write_str("not toml at all [").unwrap();

    obsflow_in(&dir, "")
        .args(["plugins", "discover"])
        .arg(dir.child("plugins").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ processing:JSON Parser"))
        .stdout(predicate::str::contains("Unknown implementation 'kafka'"))
        .stdout(predicate::str::contains("Registered 1 plugin(s), 1 failure(s)"));
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_valid_config() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["validate", "output:Webhook", "--json", r#"{"url": "https://collector.example.com"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid for output:Webhook"));
}

#[test]
fn test_validate_reports_rule_message() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["validate", "input:HTTP Endpoint", "--json", r#"{"port": 80}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Port must be between 1024 and 65535"));
}

#[test]
fn test_validate_reports_missing_field() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["validate", "output:Webhook"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Webhook URL is required"));
}

#[test]
fn test_validate_from_toml_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let file = dir.child("slack.toml");
    file.write_str("webhook_url = \"https://example.com/hook\"\n").unwrap();

    obsflow_in(&dir, "")
        .args(["validate", "alert:Slack Notifications", "--file"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid Slack webhook URL format"));
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_run_without_pipelines() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, "")
        .args(["run", "--passes", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No pipelines configured."));
}

#[test]
fn test_run_with_feed() {
    let dir = assert_fs::TempDir::new().unwrap();
    let feed = dir.child("feed.log");
    feed.write_str("{\"level\": \"error\", \"code\": 500}\n\nplain text line\n").unwrap();

    obsflow_in(&dir, PIPELINE_CONFIG)
        .args(["run", "--passes", "1", "--feed"])
        .arg(format!("ingest={}", feed.path().display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("[pass 1] api: collected 2, processed 2, sent 0, failed 0"));
}

#[test]
fn test_run_json_output() {
    let dir = assert_fs::TempDir::new().unwrap();
    let output = obsflow_in(&dir, PIPELINE_CONFIG)
        .args(["run", "--passes", "2", "--interval-ms", "1", "-f", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let passes: Vec<serde_json::Value> =
        stdout.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[1]["pass"], 2);
    assert_eq!(passes[0]["pipelines"][0]["pipeline"], "api");
    assert_eq!(passes[0]["pipelines"][0]["stats"]["events_collected"], 0);
}

#[test]
fn test_run_rejects_invalid_feed() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, PIPELINE_CONFIG)
        .args(["run", "--passes", "1", "--feed", "ingest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected ID=PATH"));
}

#[test]
fn test_run_rejects_invalid_instance() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = PIPELINE_CONFIG.replace("batch_size = 1,", "batch_size = 0,");
    obsflow_in(&dir, &config)
        .args(["run", "--passes", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Instance 'ingest'"));
}

// ============================================================================
// Instances & Export Tests
// ============================================================================

#[test]
fn test_instances_listing() {
    let dir = assert_fs::TempDir::new().unwrap();
    obsflow_in(&dir, PIPELINE_CONFIG)
        .arg("instances")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest (input:HTTP Endpoint) [Input] healthy"))
        .stdout(predicate::str::contains("Total: 2 instance(s)"));
}

#[test]
fn test_instances_mask_secrets() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = PIPELINE_CONFIG.replace(
        "format = \"auto\" }",
        "format = \"auto\", auth_token = \"s3cr3t-token\" }",
    );
    obsflow_in(&dir, &config)
        .args(["instances", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s3cr3t-token").not());
}

#[test]
fn test_export_to_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let exported = dir.child("exported.toml");

    obsflow_in(&dir, PIPELINE_CONFIG)
        .args(["export", "-o"])
        .arg(exported.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported to"));

    exported.assert(predicate::str::contains("[[pipelines]]"));
    exported.assert(predicate::str::contains("processing:JSON Parser"));
}

#[test]
fn test_export_json() {
    let dir = assert_fs::TempDir::new().unwrap();
    let output = obsflow_in(&dir, PIPELINE_CONFIG).args(["export", "-f", "json"]).output().unwrap();
    assert!(output.status.success());

    let exported: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(exported["instances"].as_array().unwrap().len(), 2);
    assert_eq!(exported["pipelines"][0]["name"], "api");
}

// ============================================================================
// Completions Tests
// ============================================================================

#[test]
fn test_completions_bash() {
    obsflow()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("obsflow"));
}
