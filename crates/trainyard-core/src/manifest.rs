//! The package-index manifest: the XML document that advertises which
//! SDK versions exist and which one is current.
//!
//! The document has a single fixed schema (`metadata` → `groupId`,
//! `artifactId`, `versioning` → `release`, `versions/version*`,
//! `lastUpdated`), so parsing is a quick extraction over that shape rather
//! than a general XML dependency. Serialization is deterministic: two-space
//! indentation, stable element order, so repeated runs over identical state
//! produce identical bytes (and identical sidecar digests).
//!
//! Mutation rules keep publication repeatable:
//! - the `release` pointer only ever moves forward in version order;
//! - `versions` only grows, and adding a present version is a no-op;
//! - `lastUpdated` is refreshed on every apply.

use chrono::{DateTime, Utc};
use md5::Md5;
use sha1::Sha1;
use sha2::Digest;
use thiserror::Error;
use tracing::{debug, info};

use crate::version::{Version, VersionError};

/// Errors from manifest parsing.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// A required element was absent from the document.
    #[error("manifest is missing the <{element}> element")]
    MissingElement {
        /// The element name.
        element: &'static str,
    },

    /// An element held an unparsable version.
    #[error("manifest holds an invalid version: {0}")]
    Version(#[from] VersionError),
}

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// The mutable facets of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// The package group identifier.
    pub group_id: String,
    /// The package artifact identifier.
    pub artifact_id: String,
    /// The currently advertised release.
    pub release: Version,
    /// Every version ever published, in document order.
    pub versions: Vec<Version>,
    /// `%Y%m%d%H%M%S` UTC stamp of the last mutation.
    pub last_updated: String,
}

/// What [`Manifest::apply_release`] actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ManifestUpdate {
    /// Whether the `release` pointer was advanced to the new version.
    pub promoted: bool,
    /// Whether the version was newly added to the version list.
    pub added: bool,
}

impl Manifest {
    /// Parse the manifest document.
    ///
    /// Missing required elements are hard errors — a manifest this pipeline
    /// cannot fully read must not be rewritten.
    pub fn parse(document: &str) -> ManifestResult<Self> {
        let group_id = element_text(document, "groupId")
            .ok_or(ManifestError::MissingElement { element: "groupId" })?
            .to_string();
        let artifact_id = element_text(document, "artifactId")
            .ok_or(ManifestError::MissingElement {
                element: "artifactId",
            })?
            .to_string();
        let versioning = element_body(document, "versioning").ok_or(
            ManifestError::MissingElement {
                element: "versioning",
            },
        )?;
        let release = Version::parse(
            element_text(versioning, "release").ok_or(ManifestError::MissingElement {
                element: "release",
            })?,
        )?;
        let versions_body =
            element_body(versioning, "versions").ok_or(ManifestError::MissingElement {
                element: "versions",
            })?;
        let versions = collect_versions(versions_body)?;
        let last_updated = element_text(versioning, "lastUpdated")
            .ok_or(ManifestError::MissingElement {
                element: "lastUpdated",
            })?
            .to_string();

        debug!(
            release = %release,
            versions = versions.len(),
            "parsed manifest"
        );
        Ok(Self {
            group_id,
            artifact_id,
            release,
            versions,
            last_updated,
        })
    }

    /// Record a published version, keeping the mutation idempotent.
    ///
    /// The `release` pointer advances only when the new version compares
    /// greater; republishing an older version is expected during recovery
    /// and must not regress what's advertised. Returns what changed.
    pub fn apply_release(&mut self, version: &Version, now: DateTime<Utc>) -> ManifestUpdate {
        let promoted = if *version > self.release {
            self.release = version.clone();
            true
        } else {
            info!(
                advertised = %self.release,
                publishing = %version,
                "existing advertised release is newer, leaving release pointer unchanged"
            );
            false
        };

        let added = if self.versions.contains(version) {
            info!(%version, "version already listed in manifest, not adding again");
            false
        } else {
            self.versions.push(version.clone());
            true
        };

        self.last_updated = now.format("%Y%m%d%H%M%S").to_string();
        ManifestUpdate { promoted, added }
    }

    /// Serialize the manifest deterministically.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(512);
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<metadata>\n");
        out.push_str(&format!("  <groupId>{}</groupId>\n", self.group_id));
        out.push_str(&format!(
            "  <artifactId>{}</artifactId>\n",
            self.artifact_id
        ));
        out.push_str("  <versioning>\n");
        out.push_str(&format!("    <release>{}</release>\n", self.release));
        out.push_str("    <versions>\n");
        for version in &self.versions {
            out.push_str(&format!("      <version>{version}</version>\n"));
        }
        out.push_str("    </versions>\n");
        out.push_str(&format!(
            "    <lastUpdated>{}</lastUpdated>\n",
            self.last_updated
        ));
        out.push_str("  </versioning>\n");
        out.push_str("</metadata>\n");
        out
    }
}

/// Hex digests published alongside the manifest so consumers can verify it.
///
/// Returns `(extension, digest)` pairs for the `.md5` and `.sha1` sidecars.
pub fn sidecar_digests(body: &[u8]) -> Vec<(&'static str, String)> {
    let md5 = format!("{:x}", Md5::digest(body));
    let sha1 = format!("{:x}", Sha1::digest(body));
    vec![("md5", md5), ("sha1", sha1)]
}

/// Text content of the first `<tag>…</tag>` in `document`, trimmed.
fn element_text<'a>(document: &'a str, tag: &str) -> Option<&'a str> {
    element_body(document, tag).map(str::trim)
}

/// Raw inner body of the first `<tag>…</tag>` in `document`.
fn element_body<'a>(document: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = document.find(&open)? + open.len();
    let end = document[start..].find(&close)? + start;
    Some(&document[start..end])
}

/// Collect every `<version>` element inside the `<versions>` body.
fn collect_versions(body: &str) -> ManifestResult<Vec<Version>> {
    let mut versions = Vec::new();
    let mut rest = body;
    while let Some(text) = element_body(rest, "version") {
        versions.push(Version::parse(text.trim())?);
        let close = "</version>";
        let after = rest.find(close).map(|i| i + close.len()).unwrap_or(0);
        rest = &rest[after..];
    }
    Ok(versions)
}
