//! CLI integration tests for mapsync.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any database
//! connection is opened.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Get a command for the mapsync binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("mapsync").unwrap();
    cmd.env_remove("MAPSYNC_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn temp_file(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

fn valid_config() -> NamedTempFile {
    temp_file(
        "target:\n  host: 127.0.0.1\n  port: 1\n  database: shop\n  user: sync\n",
        ".yaml",
    )
}

fn valid_mapping() -> NamedTempFile {
    temp_file(
        "tables:\n  product:\n    fields:\n      reference: sku\n",
        ".yaml",
    )
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--mapping"))
        .stdout(predicate::str::contains("--record"))
        .stdout(predicate::str::contains("--target-id"))
        .stdout(predicate::str::contains("--store-ids"))
        .stdout(predicate::str::contains("--strict"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mapsync"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests - Configuration (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    // Missing file is an IO error
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let file = temp_file("invalid: yaml: content: [\n", ".yaml");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let file = temp_file("sync:\n  store_ids: [1]\n", ".yaml");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_config_values_exit_with_code_2() {
    let file = temp_file(
        "target:\n  host: localhost\n  database: shop\n  user: sync\nsync:\n  store_ids: [0]\n",
        ".yaml",
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_mapping_exits_with_code_2() {
    let config = valid_config();
    let mapping = temp_file("tables: [not, a, map]\n", ".yaml");
    let record = temp_file(r#"{"id": 1}"#, ".json");

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "run",
            "--mapping",
            mapping.path().to_str().unwrap(),
            "--record",
            record.path().to_str().unwrap(),
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Mapping error"));
}

// =============================================================================
// Exit Code Tests - Source Record (Exit Code 3)
// =============================================================================

#[test]
fn test_record_without_id_exits_with_code_3() {
    let config = valid_config();
    let mapping = valid_mapping();
    let record = temp_file(r#"{"sku": "A-1"}"#, ".json");

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "run",
            "--mapping",
            mapping.path().to_str().unwrap(),
            "--record",
            record.path().to_str().unwrap(),
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no identifier"));
}

#[test]
fn test_blank_record_id_flag_exits_with_code_3() {
    let config = valid_config();
    let mapping = valid_mapping();
    let record = temp_file(r#"{"id": 7}"#, ".json");

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "run",
            "--mapping",
            mapping.path().to_str().unwrap(),
            "--record",
            record.path().to_str().unwrap(),
            "--record-id",
            " ",
        ])
        .assert()
        .code(3);
}

#[test]
fn test_malformed_record_exits_with_code_3() {
    let config = valid_config();
    let mapping = valid_mapping();
    let record = temp_file("{not json", ".json");

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "run",
            "--mapping",
            mapping.path().to_str().unwrap(),
            "--record",
            record.path().to_str().unwrap(),
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("JSON error"));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test the target database connection"));
}

#[test]
fn test_inspect_requires_entity() {
    cmd()
        .arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<ENTITY>"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
