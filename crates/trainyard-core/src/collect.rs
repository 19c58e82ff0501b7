//! Changelog collection — cutting a new release entry.
//!
//! Syncs every configured repository mirror to the release-train branch,
//! checks that the repositories agree on the SDK version (a hard
//! precondition: no entry gets cut for a train that doesn't know what it
//! is), gathers each repository's pending-changes file as a labeled
//! fragment, and inserts the dated entry into the aggregated changelog.
//!
//! Fragments are gathered in configuration order so the cut is
//! deterministic.

use camino::Utf8Path;
use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::changelog::{self, ChangeFragment};
use crate::config::TrainConfig;
use crate::resolve::{self, ResolveError};
use crate::version::Version;

/// Errors from changelog collection.
#[derive(Error, Debug)]
pub enum CollectError {
    /// Repository sync or SDK-version agreement failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Reading a pending-changes file or writing the changelog failed.
    #[error("changelog I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for collection operations.
pub type CollectResult<T> = Result<T, CollectError>;

/// The result of cutting a release entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectOutcome {
    /// The version the entry was cut for.
    pub version: Version,
    /// The date stamped on the entry.
    pub date: NaiveDate,
    /// The SDK version the repositories agreed on.
    pub sdk_version: String,
    /// The fragments that were merged, in configuration order.
    pub fragments: Vec<ChangeFragment>,
}

/// Cut a new changelog entry for a version.
///
/// `date` defaults to today (UTC) — the stamp releases normally carry —
/// and is overridable for reproducible cuts.
#[instrument(skip(train), fields(%version))]
pub fn collect_changelogs(
    train: &TrainConfig,
    cache_dir: &Utf8Path,
    version: &Version,
    date: Option<NaiveDate>,
) -> CollectResult<CollectOutcome> {
    let branch = version.release_branch();

    // Sync everything first and require agreement before touching the
    // changelog.
    let sdk_version = resolve::verify_sdk_versions(&train.repositories, cache_dir, &branch)?;
    info!(%sdk_version, "repositories agree on SDK version");

    let unreleased_file = train.unreleased_file();
    let mut fragments = Vec::new();
    for repo in &train.repositories {
        let mirror = resolve::mirror_path(cache_dir, &repo.name);
        let pending = mirror.join(&unreleased_file);
        let body = match std::fs::read_to_string(&pending) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(repo = %repo.name, "no pending-changes file");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if body.trim().is_empty() {
            debug!(repo = %repo.name, "pending-changes file is empty");
            continue;
        }
        fragments.push(ChangeFragment {
            origin: repo.name.clone(),
            body,
        });
    }

    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let changelog_path = train.changelog_path();
    let document = std::fs::read_to_string(&changelog_path)?;
    let updated = changelog::cut_release(&document, version, date, &fragments);
    std::fs::write(&changelog_path, updated)?;

    info!(
        %changelog_path,
        fragments = fragments.len(),
        "cut changelog entry"
    );
    Ok(CollectOutcome {
        version: version.clone(),
        date,
        sdk_version,
        fragments,
    })
}
