//! Configuration integration tests.
//!
//! These tests verify config discovery, format parsing, and precedence
//! from an end-to-end perspective using the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Returns a Command configured to run our binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

const TRAIN_CONFIG: &str = r#"
[[train.repositories]]
name = "Core"
url = "ssh://git@github.com/example/sdk-core"

[distribution]
repository = "Core"
bucket = "sdk-releases"
manifest_key = "releases/com/example/sdk/maven-metadata.xml"
"#;

// =============================================================================
// Config File Discovery
// =============================================================================

#[test]
fn runs_without_config_file() {
    // The CLI should work even when no config file exists
    let tmp = TempDir::new().unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "doctor"])
        .assert()
        .success();
}

#[test]
fn discovers_dotfile_config_in_current_dir() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join(".trainyard.toml");
    fs::write(&config_path, TRAIN_CONFIG).unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 repositories configured"));
}

#[test]
fn discovers_regular_config_in_current_dir() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("trainyard.toml");
    fs::write(&config_path, TRAIN_CONFIG).unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 repositories configured"));
}

#[test]
fn discovers_config_in_parent_directory() {
    let tmp = TempDir::new().unwrap();
    let sub_dir = tmp.path().join("nested").join("deep");
    fs::create_dir_all(&sub_dir).unwrap();

    // Config in root, run from nested/deep
    let config_path = tmp.path().join(".trainyard.toml");
    fs::write(&config_path, TRAIN_CONFIG).unwrap();

    cmd()
        .args(["-C", sub_dir.to_str().unwrap(), "doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 repositories configured"));
}

#[test]
fn explicit_config_flag_overrides_discovery() {
    let tmp = TempDir::new().unwrap();

    // Discovered config has no train; explicit one does
    fs::write(tmp.path().join(".trainyard.toml"), "log_level = \"warn\"\n").unwrap();
    let explicit = tmp.path().join("other.toml");
    fs::write(&explicit, TRAIN_CONFIG).unwrap();

    cmd()
        .args([
            "-C",
            tmp.path().to_str().unwrap(),
            "--config",
            explicit.to_str().unwrap(),
            "doctor",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 repositories configured"));
}

#[test]
fn yaml_config_is_parsed() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".trainyard.yaml"),
        "train:\n  repositories:\n    - name: Core\n      url: ssh://example/core\n",
    )
    .unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 repositories configured"));
}

#[test]
fn malformed_config_is_a_fatal_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".trainyard.toml"), "log_level = 42\n").unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "doctor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}
