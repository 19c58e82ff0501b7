//! Finalize command — advance repository state after publication.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use trainyard_core::config::Config;
use trainyard_core::version::Version;
use trainyard_core::{finalize, resolve};

/// Arguments for the `finalize` subcommand.
#[derive(Args, Debug)]
pub struct FinalizeArgs {
    /// Version that was published (e.g., "2.0.1" or "2.0.1-rc1")
    pub version: String,

    /// Tag and truncate locally without pushing
    #[arg(long)]
    pub no_push: bool,
}

#[derive(Serialize)]
struct FinalizeReport {
    version: Version,
    commit: String,
    tag: String,
    truncated: bool,
    pushed: bool,
}

/// Execute the finalize command.
///
/// Runs only after publication: tags the source commit, pushes tags,
/// truncates the pending-changes file, and pushes that commit. Every step
/// is idempotent, so re-running after a partial failure is safe.
#[instrument(name = "cmd_finalize", skip_all)]
pub fn cmd_finalize(args: FinalizeArgs, global_json: bool, config: &Config) -> anyhow::Result<()> {
    let version = Version::parse(&args.version)?;
    debug!(%version, no_push = args.no_push, "executing finalize command");

    let train = super::require_train(config)?;
    let distribution = super::require_distribution(config)?;
    let cache_dir = super::cache_dir(train)?;

    let repo = train
        .repository(&distribution.repository)
        .with_context(|| {
            format!(
                "[distribution] repository {:?} is not in [train] repositories",
                distribution.repository
            )
        })?;

    // Re-resolve the spec so we tag exactly the commit the artifacts were
    // built from, not whatever the mirror currently points at.
    let spec = resolve::resolve_release_spec(repo, &cache_dir, &version, &distribution.notes_ref())
        .context("failed to resolve release spec")?;
    let mirror = resolve::mirror_path(&cache_dir, &repo.name);

    finalize::tag_source_commit(&mirror, &spec.commit, &version)
        .context("failed to tag source commit")?;
    if !args.no_push {
        finalize::push_tags(&mirror).context("failed to push tags")?;
    }

    let truncated = finalize::truncate_unreleased(&mirror, &train.unreleased_file(), &version)
        .context("failed to truncate pending changes")?;
    if truncated && !args.no_push {
        finalize::push_commits(&mirror).context("failed to push commits")?;
    }

    let report = FinalizeReport {
        tag: format!("v{version}"),
        commit: spec.commit,
        version,
        truncated,
        pushed: !args.no_push,
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} Tagged {} at {}",
            "✓".green(),
            report.tag.bold(),
            report.commit[..12.min(report.commit.len())].to_string().dimmed(),
        );
        if report.truncated {
            println!("{} Truncated {}", "✓".green(), train.unreleased_file());
        } else {
            println!(
                "{} {} already empty, nothing to truncate",
                "○".yellow(),
                train.unreleased_file()
            );
        }
        if !report.pushed {
            println!("{}", "Push skipped (--no-push)".dimmed());
        }
    }

    Ok(())
}
