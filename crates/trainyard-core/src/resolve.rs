//! Release spec resolution from commit-scoped artifact notes.
//!
//! Build pipelines annotate the release-train tip with structured notes,
//! one line per attribute:
//!
//! ```text
//! Maven/url: https://builds.example.com.s3.amazonaws.com/sdk-2.0.0.tar.xz
//! Maven/sha256: 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! ```
//!
//! Resolution syncs the publishing repository's mirror to the train branch,
//! reads the note attached to the tip, and parses it into typed
//! [`ArtifactSpec`] values. Malformed lines are errors, not silently
//! skipped: a note this pipeline cannot read is a note nobody should
//! publish from.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::RepoConfig;
use crate::git::{self, GitError};
use crate::version::Version;

/// Attribute naming the artifact's download location.
const ATTR_URL: &str = "url";
/// Attribute naming the artifact's SHA-256 checksum.
const ATTR_SHA256: &str = "sha256";

/// Errors from release spec resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// An artifact note line did not match `artifactName/attribute: value`.
    #[error("malformed artifact note line: {line:?}")]
    MalformedArtifactNote {
        /// The offending line.
        line: String,
    },

    /// An artifact's note is missing a required attribute.
    #[error("artifact {artifact} note is missing the {attribute} attribute")]
    MissingAttribute {
        /// The artifact name from the note.
        artifact: String,
        /// The attribute that was expected.
        attribute: &'static str,
    },

    /// The configured repositories disagree on the SDK version.
    #[error("SDK repos do not agree on SDK version, found {}", found.join(" and "))]
    SdkVersionMismatch {
        /// The distinct versions that were declared.
        found: Vec<String>,
    },

    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Failed to run a repository's version script.
    #[error("failed to read SDK version from {repo}: {source}")]
    VersionScript {
        /// The repository name.
        repo: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// A durable pointer to one platform's build artifact for a release.
///
/// Resolved from repository metadata, never invented locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSpec {
    /// The artifact name from the note (e.g., `Maven`).
    pub platform: String,
    /// Where the built bytes live.
    pub url: String,
    /// SHA-256 hex digest of the built bytes.
    pub checksum: String,
    /// The source commit the artifact was built from.
    pub commit: String,
}

/// The resolved artifacts for a release, keyed by platform.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSpec {
    /// The release-train tip the spec was resolved from.
    pub commit: String,
    /// One spec per distributable artifact, in stable name order.
    pub artifacts: BTreeMap<String, ArtifactSpec>,
}

/// Parse artifact note text into per-platform specs.
///
/// Every non-blank line must match `artifactName/attribute: value`.
/// Attributes other than the required `url` and `sha256` are read and
/// ignored (build pipelines attach extras like mapping-file locations).
pub fn parse_artifact_notes(text: &str, commit: &str) -> ResolveResult<ReleaseSpec> {
    let mut attributes: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (artifact, attribute, value) = parse_note_line(line)?;
        attributes
            .entry(artifact.to_string())
            .or_default()
            .insert(attribute.to_string(), value.to_string());
    }

    let mut artifacts = BTreeMap::new();
    for (name, attrs) in attributes {
        let url = attrs
            .get(ATTR_URL)
            .ok_or_else(|| ResolveError::MissingAttribute {
                artifact: name.clone(),
                attribute: ATTR_URL,
            })?;
        let checksum = attrs
            .get(ATTR_SHA256)
            .ok_or_else(|| ResolveError::MissingAttribute {
                artifact: name.clone(),
                attribute: ATTR_SHA256,
            })?;
        artifacts.insert(
            name.clone(),
            ArtifactSpec {
                platform: name,
                url: url.clone(),
                checksum: checksum.clone(),
                commit: commit.to_string(),
            },
        );
    }

    debug!(count = artifacts.len(), "parsed artifact notes");
    Ok(ReleaseSpec {
        commit: commit.to_string(),
        artifacts,
    })
}

/// Split one note line into `(artifact, attribute, value)`.
///
/// Identifiers are word characters only; the value is everything after the
/// colon, trimmed, and must be non-empty.
fn parse_note_line(line: &str) -> ResolveResult<(&str, &str, &str)> {
    let malformed = || ResolveError::MalformedArtifactNote {
        line: line.to_string(),
    };

    let (name, rest) = line.split_once('/').ok_or_else(malformed)?;
    let (attribute, value) = rest.split_once(':').ok_or_else(malformed)?;
    let value = value.trim();

    let is_ident =
        |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !is_ident(name) || !is_ident(attribute) || value.is_empty() {
        return Err(malformed());
    }

    Ok((name, attribute, value))
}

/// Resolve the release spec for a version from the publishing repository.
///
/// Syncs the repository's mirror to the release-train branch and reads the
/// artifact note attached to the tip.
#[instrument(skip(repo), fields(repo = %repo.name, %version))]
pub fn resolve_release_spec(
    repo: &RepoConfig,
    cache_dir: &Utf8Path,
    version: &Version,
    notes_ref: &str,
) -> ResolveResult<ReleaseSpec> {
    let mirror = mirror_path(cache_dir, &repo.name);
    git::sync_mirror(&repo.url, &mirror, &version.release_branch())?;

    let commit = git::rev_parse(&mirror, "HEAD")?;
    let note = git::show_note(&mirror, notes_ref, &commit)?;
    let spec = parse_artifact_notes(&note, &commit)?;
    info!(
        commit = %spec.commit,
        artifacts = spec.artifacts.len(),
        "resolved release spec"
    );
    Ok(spec)
}

/// Sync every configured repository to the train branch and check that
/// they agree on the SDK version.
///
/// Each core repository declares its version through a `tools/get-version.sh`
/// script; wrapper repositories lack the script and don't vote. Publication
/// requires exactly one distinct declared version.
#[instrument(skip(repos, cache_dir))]
pub fn verify_sdk_versions(
    repos: &[RepoConfig],
    cache_dir: &Utf8Path,
    branch: &str,
) -> ResolveResult<String> {
    let mut declared: Vec<String> = Vec::new();

    for repo in repos {
        let mirror = mirror_path(cache_dir, &repo.name);
        git::sync_mirror(&repo.url, &mirror, branch)?;

        if let Some(version) = repo_sdk_version(repo, &mirror)? {
            debug!(repo = %repo.name, %version, "repo declares SDK version");
            if !declared.contains(&version) {
                declared.push(version);
            }
        }
    }

    if declared.len() == 1 {
        Ok(declared.remove(0))
    } else {
        Err(ResolveError::SdkVersionMismatch { found: declared })
    }
}

/// The mirror directory for a named repository.
pub fn mirror_path(cache_dir: &Utf8Path, repo_name: &str) -> Utf8PathBuf {
    cache_dir.join(repo_name.to_lowercase())
}

/// Run a repository's version script, if it has one.
fn repo_sdk_version(repo: &RepoConfig, mirror: &Utf8Path) -> ResolveResult<Option<String>> {
    let script = mirror.join("tools").join("get-version.sh");
    if !script.exists() {
        return Ok(None);
    }

    let output = std::process::Command::new(script.as_str())
        .current_dir(mirror.as_std_path())
        .output()
        .map_err(|source| ResolveError::VersionScript {
            repo: repo.name.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ResolveError::VersionScript {
            repo: repo.name.clone(),
            source: std::io::Error::other(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    Ok(Some(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}
