//! Preflight checks for release readiness.
//!
//! Validates tool availability, train configuration, and the mirror cache
//! before a release command runs. Returns structured results that the CLI
//! formats.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::git;
use crate::storage::AwsCli;

/// A single preflight check result.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Human-readable name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Description of the result (reason for failure, or confirmation).
    pub message: String,
}

/// Full preflight report.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    /// Individual check results.
    pub checks: Vec<CheckResult>,
    /// Whether all checks passed.
    pub all_passed: bool,
}

/// Run all preflight checks.
#[instrument(skip(config))]
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    checks.push(check_tool("git", git::ensure_available()));
    checks.push(check_tool("aws", AwsCli::ensure_available()));
    checks.push(check_tool("tar", which::which("tar").is_ok()));
    checks.push(check_train_config(config));
    checks.push(check_distribution_config(config));
    checks.push(check_cache_dir(config));

    let all_passed = checks.iter().all(|c| c.passed);
    debug!(all_passed, check_count = checks.len(), "preflight complete");

    PreflightReport { checks, all_passed }
}

fn check_tool(name: &str, available: bool) -> CheckResult {
    CheckResult {
        name: format!("{name} binary"),
        passed: available,
        message: if available {
            format!("{name} is on PATH")
        } else {
            format!("{name} not found on PATH")
        },
    }
}

fn check_train_config(config: &Config) -> CheckResult {
    match config.train {
        Some(ref train) if !train.repositories.is_empty() => CheckResult {
            name: "Train configuration".into(),
            passed: true,
            message: format!("{} repositories configured", train.repositories.len()),
        },
        Some(_) => CheckResult {
            name: "Train configuration".into(),
            passed: false,
            message: "[train] has no repositories".into(),
        },
        None => CheckResult {
            name: "Train configuration".into(),
            passed: false,
            message: "No [train] section in configuration".into(),
        },
    }
}

fn check_distribution_config(config: &Config) -> CheckResult {
    let Some(ref distribution) = config.distribution else {
        return CheckResult {
            name: "Distribution configuration".into(),
            passed: false,
            message: "No [distribution] section in configuration".into(),
        };
    };

    let mut missing = Vec::new();
    if distribution.repository.is_empty() {
        missing.push("repository");
    }
    if distribution.bucket.is_empty() {
        missing.push("bucket");
    }
    if distribution.manifest_key.is_empty() {
        missing.push("manifest_key");
    }

    // The publishing repository must be one of the train's repositories.
    let known = config.train.as_ref().is_some_and(|train| {
        train.repository(&distribution.repository).is_some()
    });

    if !missing.is_empty() {
        CheckResult {
            name: "Distribution configuration".into(),
            passed: false,
            message: format!("[distribution] is missing: {}", missing.join(", ")),
        }
    } else if !known {
        CheckResult {
            name: "Distribution configuration".into(),
            passed: false,
            message: format!(
                "[distribution] repository {:?} is not in [train] repositories",
                distribution.repository
            ),
        }
    } else {
        CheckResult {
            name: "Distribution configuration".into(),
            passed: true,
            message: format!(
                "Publishing {} to s3://{}",
                distribution.repository, distribution.bucket
            ),
        }
    }
}

fn check_cache_dir(config: &Config) -> CheckResult {
    let cache_dir = config
        .train
        .as_ref()
        .and_then(crate::config::TrainConfig::cache_dir);

    match cache_dir {
        Some(dir) => match std::fs::create_dir_all(&dir) {
            Ok(()) => CheckResult {
                name: "Mirror cache".into(),
                passed: true,
                message: format!("Mirrors live in {dir}"),
            },
            Err(e) => CheckResult {
                name: "Mirror cache".into(),
                passed: false,
                message: format!("Cannot create {dir}: {e}"),
            },
        },
        None => CheckResult {
            name: "Mirror cache".into(),
            passed: false,
            message: "No cache directory configured and no platform default".into(),
        },
    }
}
