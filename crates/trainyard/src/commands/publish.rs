//! Publish command — resolve the release spec and run the publication
//! pipeline with progress display.

use anyhow::{Context, bail};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use trainyard_core::config::Config;
use trainyard_core::publish::{Distribution, PublishEvent, Publisher};
use trainyard_core::resolve::{self, ArtifactSpec};
use trainyard_core::storage::AwsCli;
use trainyard_core::version::Version;

/// Arguments for the `publish` subcommand.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Version to publish (e.g., "2.0.1" or "2.0.1-rc1")
    pub version: String,

    /// Publish only this artifact (repeatable; default: all in the spec)
    #[arg(long = "artifact", value_name = "NAME")]
    pub artifacts: Vec<String>,

    /// Resolve and show what would be published without publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Execute the publish command.
#[instrument(name = "cmd_publish", skip_all)]
pub fn cmd_publish(args: PublishArgs, global_json: bool, config: &Config) -> anyhow::Result<()> {
    let version = Version::parse(&args.version)?;
    debug!(%version, dry_run = args.dry_run, "executing publish command");

    let train = super::require_train(config)?;
    let distribution_config = super::require_distribution(config)?;
    let cache_dir = super::cache_dir(train)?;

    let repo = train
        .repository(&distribution_config.repository)
        .with_context(|| {
            format!(
                "[distribution] repository {:?} is not in [train] repositories",
                distribution_config.repository
            )
        })?;

    // Resolve the release spec from the repository's artifact notes.
    let spinner = progress_spinner(global_json, "Resolving release spec...");
    let spec = resolve::resolve_release_spec(
        repo,
        &cache_dir,
        &version,
        &distribution_config.notes_ref(),
    )
    .context("failed to resolve release spec")?;
    if let Some(ref spinner) = spinner {
        spinner.finish_and_clear();
    }

    let selected = select_artifacts(&spec.artifacts, distribution_config.artifacts.as_deref(), &args.artifacts)?;

    if args.dry_run {
        if global_json {
            println!("{}", serde_json::to_string_pretty(&selected)?);
        } else {
            println!("{}", "DRY RUN — nothing will be published".yellow().bold());
            for artifact in &selected {
                println!(
                    "Would publish {} from {} ({})",
                    artifact.platform.bold(),
                    artifact.url,
                    format!("sha256 {}", &artifact.checksum[..12.min(artifact.checksum.len())])
                        .dimmed(),
                );
            }
        }
        return Ok(());
    }

    if !global_json {
        println!(
            "\n{}: {} at commit {}",
            "Publish".bold(),
            version.to_string().green().bold(),
            spec.commit[..12.min(spec.commit.len())].to_string().dimmed(),
        );
        for artifact in &selected {
            println!("  {} {}", "•".dimmed(), artifact.platform);
        }
        println!();
    }

    // Confirm before mutating shared state, unless told not to ask.
    if !args.yes && !global_json && std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let proceed = Confirm::new(&format!(
            "Publish {} artifact(s) to s3://{}?",
            selected.len(),
            distribution_config.bucket
        ))
        .with_default(false)
        .prompt()
        .context("confirmation cancelled")?;
        if !proceed {
            println!("{}", "Cancelled.".yellow());
            return Ok(());
        }
    }

    let store = AwsCli;
    let publisher = Publisher::new(
        &store,
        Distribution {
            bucket: distribution_config.bucket.clone(),
            manifest_key: distribution_config.manifest_key.clone(),
        },
    );

    // Artifacts are published sequentially; a failure leaves a well-defined
    // prefix of idempotent side effects and the operator re-invokes.
    let mut outcomes = Vec::new();
    for artifact in &selected {
        let spinner = progress_spinner(global_json, &format!("{}: starting", artifact.platform));
        let platform = artifact.platform.clone();
        let outcome = publisher
            .publish_artifact(artifact, &version, |event| {
                if let Some(ref spinner) = spinner {
                    render_event(spinner, &platform, &event);
                }
            })
            .with_context(|| format!("failed to publish {}", artifact.platform))?;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        if !global_json {
            let manifest_note = if outcome.manifest.promoted {
                format!("manifest now advertises {version}")
            } else {
                "a newer release stays advertised".to_string()
            };
            println!(
                "{} Published {} ({} files, {manifest_note})",
                "✓".green(),
                outcome.platform.bold(),
                outcome.uploaded_files,
            );
        }
        outcomes.push(outcome);
    }

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }

    Ok(())
}

/// Narrow the resolved artifacts to the configured/requested set.
///
/// Selection order is the spec's stable name order; explicitly requested
/// names that the spec doesn't carry are errors.
fn select_artifacts(
    resolved: &std::collections::BTreeMap<String, ArtifactSpec>,
    configured: Option<&[String]>,
    requested: &[String],
) -> anyhow::Result<Vec<ArtifactSpec>> {
    let wanted: Option<Vec<&String>> = if !requested.is_empty() {
        Some(requested.iter().collect())
    } else {
        configured.map(|names| names.iter().collect())
    };

    if let Some(ref names) = wanted {
        for name in names {
            if !resolved.contains_key(name.as_str()) {
                bail!(
                    "artifact {name:?} is not in the release spec (available: {})",
                    resolved.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            }
        }
    }

    let selected: Vec<ArtifactSpec> = resolved
        .values()
        .filter(|artifact| {
            wanted
                .as_ref()
                .is_none_or(|names| names.iter().any(|name| **name == artifact.platform))
        })
        .cloned()
        .collect();

    if selected.is_empty() {
        bail!("the release spec has no artifacts to publish");
    }
    Ok(selected)
}

/// A steady-tick spinner, suppressed in JSON mode.
fn progress_spinner(global_json: bool, message: &str) -> Option<ProgressBar> {
    if global_json {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    Some(spinner)
}

/// Update the spinner from pipeline events.
fn render_event(spinner: &ProgressBar, platform: &str, event: &PublishEvent) {
    match event {
        PublishEvent::PhaseStarted(phase) => {
            spinner.set_message(format!("{platform}: {phase}..."));
        }
        PublishEvent::PhaseCompleted(_, outcome) => {
            let trainyard_core::publish::PhaseOutcome::Success { message } = outcome;
            spinner.set_message(format!("{platform}: {message}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn resolved() -> BTreeMap<String, ArtifactSpec> {
        let mut map = BTreeMap::new();
        for name in ["Maven", "Unity"] {
            map.insert(
                name.to_string(),
                ArtifactSpec {
                    platform: name.to_string(),
                    url: format!("https://builds.example.s3.amazonaws.com/{name}.tar.xz"),
                    checksum: "ab".repeat(32),
                    commit: "cd".repeat(20),
                },
            );
        }
        map
    }

    #[test]
    fn defaults_to_every_resolved_artifact() {
        let selected = select_artifacts(&resolved(), None, &[]).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn config_filter_narrows_selection() {
        let configured = vec!["Maven".to_string()];
        let selected = select_artifacts(&resolved(), Some(&configured), &[]).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].platform, "Maven");
    }

    #[test]
    fn cli_filter_overrides_config_filter() {
        let configured = vec!["Maven".to_string()];
        let requested = vec!["Unity".to_string()];
        let selected = select_artifacts(&resolved(), Some(&configured), &requested).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].platform, "Unity");
    }

    #[test]
    fn unknown_artifact_is_an_error() {
        let requested = vec!["Cocoapods".to_string()];
        let err = select_artifacts(&resolved(), None, &requested).unwrap_err();
        assert!(err.to_string().contains("Cocoapods"));
        assert!(err.to_string().contains("Maven, Unity"));
    }
}
