//! Releases command — list the history recorded in the changelog.

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Args;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use trainyard_core::changelog;
use trainyard_core::config::Config;

/// Arguments for the `releases` subcommand.
#[derive(Args, Debug, Default)]
pub struct ReleasesArgs {
    /// Changelog document to read (default: the configured path)
    #[arg(long, value_name = "FILE")]
    pub changelog: Option<Utf8PathBuf>,

    /// Look up the release date of a single version
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Show full change text instead of a summary line
    #[arg(long)]
    pub full: bool,
}

/// Execute the releases command.
#[instrument(name = "cmd_releases", skip_all)]
pub fn cmd_releases(args: ReleasesArgs, global_json: bool, config: &Config) -> anyhow::Result<()> {
    let path = args.changelog.unwrap_or_else(|| {
        config
            .train
            .as_ref()
            .map(|train| train.changelog_path())
            .unwrap_or_else(|| Utf8PathBuf::from("CHANGELOG.md"))
    });
    debug!(%path, "listing releases");

    let document = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read changelog at {path}"))?;

    // Single-version lookup: a missing entry is a hard error, not an empty
    // listing — downstream tooling stamps archives with this date.
    if let Some(ref version) = args.version {
        let version = trainyard_core::Version::parse(version)?;
        let date = changelog::release_date(&document, &version)?;
        if global_json {
            println!(
                "{}",
                serde_json::json!({ "version": version, "released_at": date })
            );
        } else {
            println!("{} was released on {}", version, date.format("%Y-%m-%d"));
        }
        return Ok(());
    }

    let releases = changelog::parse(&document);

    if global_json {
        println!("{}", serde_json::to_string_pretty(&releases)?);
        return Ok(());
    }

    if releases.is_empty() {
        println!("{} No releases recorded in {}", "○".yellow(), path);
        return Ok(());
    }

    for release in &releases {
        println!(
            "{}  {}",
            release.version.to_string().bold(),
            release
                .released_at
                .format("%Y-%m-%d")
                .to_string()
                .dimmed(),
        );
        if args.full {
            let body = release.changes.trim();
            if !body.is_empty() {
                println!("{body}");
            }
            println!();
        }
    }

    Ok(())
}
