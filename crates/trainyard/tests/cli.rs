//! End-to-end CLI integration tests
//!
//! These tests invoke the compiled binary as a subprocess to verify
//! that the CLI behaves correctly from a user's perspective.

use assert_cmd::Command;
use predicates::prelude::*;

/// Returns a Command configured to run our binary.
///
/// Note: `cargo_bin` is marked deprecated for edge cases involving custom
/// cargo build directories, but works correctly for standard project layouts.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_shows_usage() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("Options:"));
}

#[test]
fn short_help_flag_shows_usage() {
    cmd()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn help_lists_pipeline_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("finalize"))
        .stdout(predicate::str::contains("releases"));
}

#[test]
fn version_flag_shows_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn short_version_flag_shows_version() {
    cmd()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// =============================================================================
// Doctor Command
// =============================================================================

#[test]
fn doctor_reports_configuration() {
    cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration"))
        .stdout(predicate::str::contains("Release readiness"));
}

#[test]
fn doctor_json_outputs_valid_json() {
    let output = cmd().arg("doctor").arg("--json").assert().success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("doctor --json should output valid JSON");

    assert!(json["preflight"]["checks"].is_array());
    assert!(json["directories"].is_object());
}

// =============================================================================
// Releases Command
// =============================================================================

#[test]
fn releases_lists_changelog_entries() {
    let tmp = tempfile::TempDir::new().unwrap();
    let changelog = tmp.path().join("CHANGELOG.md");
    std::fs::write(
        &changelog,
        "# Changelog\n\nAll notable changes.\n\n\n\
         2.0.0 - 2024-03-01\n==================\n- New pipeline\n\n\
         1.9.2 - 2024-01-15\n------------------\n- Crash fix\n",
    )
    .unwrap();

    cmd()
        .args(["releases", "--changelog", changelog.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.0.0"))
        .stdout(predicate::str::contains("2024-03-01"))
        .stdout(predicate::str::contains("1.9.2"));
}

#[test]
fn releases_json_outputs_release_records() {
    let tmp = tempfile::TempDir::new().unwrap();
    let changelog = tmp.path().join("CHANGELOG.md");
    std::fs::write(
        &changelog,
        "# Changelog\n\n\n\n\n2.0.0-rc1 - 2024-02-20\n======================\n- candidate\n",
    )
    .unwrap();

    let output = cmd()
        .args([
            "releases",
            "--changelog",
            changelog.to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("releases --json should output valid JSON");

    assert_eq!(json[0]["version"], "2.0.0-rc1");
    assert_eq!(json[0]["released_at"], "2024-02-20");
}

#[test]
fn releases_version_lookup_prints_date() {
    let tmp = tempfile::TempDir::new().unwrap();
    let changelog = tmp.path().join("CHANGELOG.md");
    std::fs::write(
        &changelog,
        "# Changelog\n\n\n\n\n2.0.0 - 2024-03-01\n==================\n- New pipeline\n",
    )
    .unwrap();

    cmd()
        .args([
            "releases",
            "--changelog",
            changelog.to_str().unwrap(),
            "--version",
            "2.0.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03-01"));
}

#[test]
fn releases_version_lookup_missing_entry_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let changelog = tmp.path().join("CHANGELOG.md");
    std::fs::write(
        &changelog,
        "# Changelog\n\n\n\n\n2.0.0 - 2024-03-01\n==================\n- New pipeline\n",
    )
    .unwrap();

    cmd()
        .args([
            "releases",
            "--changelog",
            changelog.to_str().unwrap(),
            "--version",
            "9.9.9",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no entry in the changelog"));
}

#[test]
fn releases_missing_changelog_fails() {
    cmd()
        .args(["releases", "--changelog", "/nonexistent/CHANGELOG.md"])
        .assert()
        .failure();
}

// =============================================================================
// Version Argument Validation
// =============================================================================

#[test]
fn collect_rejects_invalid_version() {
    cmd()
        .args(["collect", "not-a-version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version"));
}

#[test]
fn publish_rejects_invalid_version() {
    cmd()
        .args(["publish", "2.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version"));
}

#[test]
fn finalize_rejects_invalid_version() {
    cmd()
        .args(["finalize", "v2.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version"));
}

#[test]
fn publish_without_configuration_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "publish", "2.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[train]"));
}

// =============================================================================
// Global Flags
// =============================================================================

#[test]
fn quiet_flag_accepted() {
    cmd().args(["--quiet", "doctor"]).assert().success();
}

#[test]
fn short_quiet_flag_accepted() {
    cmd().args(["-q", "doctor"]).assert().success();
}

#[test]
fn verbose_flag_accepted() {
    cmd().args(["--verbose", "doctor"]).assert().success();
}

#[test]
fn short_verbose_flag_accepted() {
    cmd().args(["-v", "doctor"]).assert().success();
}

#[test]
fn multiple_verbose_flags_accepted() {
    cmd().args(["-vv", "doctor"]).assert().success();
}

#[test]
fn color_auto_accepted() {
    cmd().args(["--color", "auto", "doctor"]).assert().success();
}

#[test]
fn color_always_accepted() {
    cmd()
        .args(["--color", "always", "doctor"])
        .assert()
        .success();
}

#[test]
fn color_never_accepted() {
    cmd()
        .args(["--color", "never", "doctor"])
        .assert()
        .success();
}

// =============================================================================
// Error Cases
// =============================================================================

#[test]
fn no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn invalid_subcommand_shows_error() {
    cmd()
        .arg("not-a-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn invalid_flag_shows_error() {
    cmd()
        .arg("--not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

// =============================================================================
// Chdir Flag
// =============================================================================

#[test]
fn chdir_flag_changes_directory() {
    // The -C flag should be accepted and work without error
    // We use a path that definitely exists
    cmd().args(["-C", "/tmp", "doctor"]).assert().success();
}

#[test]
fn chdir_nonexistent_fails() {
    cmd()
        .args(["-C", "/nonexistent/path/that/does/not/exist", "doctor"])
        .assert()
        .failure();
}
