//! Collect command — thin CLI layer over `trainyard_core::collect`.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use trainyard_core::changelog;
use trainyard_core::collect;
use trainyard_core::config::Config;
use trainyard_core::version::Version;

/// Arguments for the `collect` subcommand.
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Version to cut the changelog entry for (e.g., "2.0.1" or "2.0.1-rc1")
    pub version: String,

    /// Date to stamp on the entry (default: today, UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,
}

/// Execute the collect command.
#[instrument(name = "cmd_collect", skip_all)]
pub fn cmd_collect(args: CollectArgs, global_json: bool, config: &Config) -> anyhow::Result<()> {
    let version = Version::parse(&args.version)?;
    let date = args
        .date
        .as_deref()
        .map(changelog::parse_date)
        .transpose()?;
    debug!(%version, ?date, "collecting changelogs");

    let train = super::require_train(config)?;
    let cache_dir = super::cache_dir(train)?;

    let outcome = collect::collect_changelogs(train, &cache_dir, &version, date)
        .context("failed to collect changelogs")?;

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.fragments.is_empty() {
        println!(
            "{} No pending changes in any repository — cut an empty entry for {}",
            "○".yellow(),
            outcome.version.to_string().bold()
        );
    } else {
        for fragment in &outcome.fragments {
            println!("{}", format!("{} changes:", fragment.origin).bold());
            println!("{}", fragment.body.trim_end());
            println!();
        }
    }

    println!(
        "{} Cut changelog entry {} ({})",
        "✓".green(),
        format!("{} - {}", outcome.version, outcome.date.format("%Y-%m-%d")).bold(),
        format!("SDK version {}", outcome.sdk_version).dimmed(),
    );

    Ok(())
}
