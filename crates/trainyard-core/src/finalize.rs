//! Post-publication repository advancement.
//!
//! Runs only after every in-scope artifact has been published: tags the
//! source commit, pushes, truncates the pending-changes log, and pushes
//! that commit. Each step is individually idempotent so an interrupted
//! finalize can be re-run without duplicating tags or commits.

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::git::{self, GitError};
use crate::version::Version;

/// Errors from release finalization.
#[derive(Error, Debug)]
pub enum FinalizeError {
    /// The release tag already exists and points at a different commit.
    ///
    /// Tags never silently move; the operator has to resolve this.
    #[error("tag {tag} already exists at {existing}, refusing to move it to {requested}")]
    TagAlreadyExists {
        /// The tag name.
        tag: String,
        /// The commit the existing tag points at.
        existing: String,
        /// The commit this run wanted to tag.
        requested: String,
    },

    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Reading or writing the pending-changes file failed.
    #[error("pending-changes file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for finalization operations.
pub type FinalizeResult<T> = Result<T, FinalizeError>;

/// Tag the source commit as `v{version}`.
///
/// Re-running against the same commit is a no-op; against a different
/// commit it fails with [`FinalizeError::TagAlreadyExists`].
#[instrument(skip(dir))]
pub fn tag_source_commit(
    dir: &Utf8Path,
    commit: &str,
    version: &Version,
) -> FinalizeResult<()> {
    let tag = format!("v{version}");
    let requested = git::rev_parse(dir, commit)?;

    if let Some(existing) = git::tag_target(dir, &tag)? {
        if existing == requested {
            info!(%tag, "tag already exists at the release commit, nothing to do");
            return Ok(());
        }
        return Err(FinalizeError::TagAlreadyExists {
            tag,
            existing,
            requested,
        });
    }

    git::create_annotated_tag(dir, &tag, &format!("Release v{version}"), commit)?;
    info!(%tag, %requested, "tagged source commit");
    Ok(())
}

/// Push tags to the shared remote.
pub fn push_tags(dir: &Utf8Path) -> FinalizeResult<()> {
    git::push(dir, true)?;
    Ok(())
}

/// Push commits to the shared remote.
pub fn push_commits(dir: &Utf8Path) -> FinalizeResult<()> {
    git::push(dir, false)?;
    Ok(())
}

/// Clear the pending-changes file and commit the clearing.
///
/// Returns `true` if a commit was made. An already-empty file is a logged
/// no-op, which is what makes re-invocation after a partial prior run
/// perform exactly one commit in total.
#[instrument(skip(dir))]
pub fn truncate_unreleased(
    dir: &Utf8Path,
    unreleased_file: &str,
    version: &Version,
) -> FinalizeResult<bool> {
    let path = dir.join(unreleased_file);

    if std::fs::metadata(&path)?.len() == 0 {
        info!(%path, "pending-changes file already empty, nothing to truncate");
        return Ok(false);
    }

    std::fs::write(&path, "")?;
    git::add(dir, unreleased_file)?;
    let message = format!(
        "Truncate {unreleased_file}\n\nThese changes were released in {version}"
    );
    let hash = git::commit(dir, &message)?;
    debug!(%hash, "committed truncation");
    Ok(true)
}
