//! Artifact publication pipeline.
//!
//! Each artifact moves through FETCH → VERIFY → UNPACK → UPLOAD → MANIFEST,
//! stopping at the first failure. There is no rollback and no transaction
//! log: every externally visible step is an idempotent overwrite, so the
//! recovery story for a crashed or interrupted run is simply to run it
//! again and converge on the same end state.
//!
//! Events are emitted at phase boundaries so the CLI can update progress
//! display; the final [`PublishOutcome`] carries a machine-readable summary.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::manifest::{Manifest, ManifestError, ManifestUpdate};
use crate::resolve::ArtifactSpec;
use crate::storage::{self, ObjectStore, StorageError};
use crate::version::Version;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors from the publication pipeline.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The downloaded artifact does not match its resolved checksum.
    ///
    /// Fatal and never downgraded: a mismatch means corruption or
    /// tampering, and the bytes must not reach the distribution endpoint.
    #[error(
        "artifact checksum mismatch for {url}: expected {expected}, computed {actual}"
    )]
    ChecksumMismatch {
        /// The artifact URL.
        url: String,
        /// The checksum the release spec declared.
        expected: String,
        /// The checksum computed over the downloaded bytes.
        actual: String,
    },

    /// The artifact URL could not be mapped to a storage location.
    #[error("artifact URL {url:?} is not a recognized object-storage URL")]
    InvalidArtifactUrl {
        /// The offending URL.
        url: String,
    },

    /// Unpacking the artifact archive failed.
    #[error("failed to unpack artifact: {message}")]
    Unpack {
        /// Details from the archive tool.
        message: String,
    },

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The distribution manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Local staging I/O failed.
    #[error("staging I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for publication operations.
pub type PublishResult<T> = Result<T, PublishError>;

// ──────────────────────────────────────────────
// Phases and events
// ──────────────────────────────────────────────

/// Phases of the publication pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPhase {
    /// Stream the artifact to local staging.
    Fetch,
    /// Check the staged bytes against the resolved checksum.
    Verify,
    /// Expand the archive into a staged tree.
    Unpack,
    /// Publish every staged file to the release bucket.
    Upload,
    /// Record the version in the distribution manifest.
    Manifest,
}

impl std::fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Verify => write!(f, "verify"),
            Self::Unpack => write!(f, "unpack"),
            Self::Upload => write!(f, "upload"),
            Self::Manifest => write!(f, "manifest"),
        }
    }
}

/// Events emitted during publication for progress reporting.
#[derive(Debug, Clone)]
pub enum PublishEvent {
    /// A phase has started for the named artifact.
    PhaseStarted(PublishPhase),
    /// A phase has completed for the named artifact.
    PhaseCompleted(PublishPhase, PhaseOutcome),
}

/// Outcome of a single phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PhaseOutcome {
    /// Phase completed successfully.
    Success {
        /// Description of what happened.
        message: String,
    },
}

/// Outcome of publishing one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    /// The version that was published.
    pub version: Version,
    /// The artifact that was published.
    pub platform: String,
    /// Number of files uploaded from the unpacked tree.
    pub uploaded_files: usize,
    /// What the manifest mutation changed.
    pub manifest: ManifestUpdate,
}

// ──────────────────────────────────────────────
// Publisher
// ──────────────────────────────────────────────

/// Distribution endpoint coordinates for the publication pipeline.
#[derive(Debug, Clone)]
pub struct Distribution {
    /// The bucket that serves released files.
    pub bucket: String,
    /// The manifest's key inside the release bucket.
    pub manifest_key: String,
}

/// Runs the per-artifact publication pipeline against an object store.
pub struct Publisher<'a, S> {
    store: &'a S,
    distribution: Distribution,
}

impl<'a, S: ObjectStore> Publisher<'a, S> {
    /// Create a publisher for a distribution endpoint.
    pub const fn new(store: &'a S, distribution: Distribution) -> Self {
        Self {
            store,
            distribution,
        }
    }

    /// Publish one artifact end to end.
    ///
    /// Stops at the first failed phase; bytes already published by earlier
    /// phases stay in place for the next (idempotent) attempt.
    #[instrument(skip(self, spec, on_event), fields(platform = %spec.platform, %version))]
    pub fn publish_artifact(
        &self,
        spec: &ArtifactSpec,
        version: &Version,
        mut on_event: impl FnMut(PublishEvent),
    ) -> PublishResult<PublishOutcome> {
        let staging = tempfile::tempdir()?;
        let staging_root = Utf8Path::from_path(staging.path())
            .ok_or_else(|| std::io::Error::other("staging dir is not valid UTF-8"))?;

        // ── Fetch ──
        on_event(PublishEvent::PhaseStarted(PublishPhase::Fetch));
        let (archive_path, bytes_len) = self.fetch(spec, staging_root)?;
        on_event(PublishEvent::PhaseCompleted(
            PublishPhase::Fetch,
            PhaseOutcome::Success {
                message: format!("Fetched {bytes_len} bytes"),
            },
        ));

        // ── Verify ──
        on_event(PublishEvent::PhaseStarted(PublishPhase::Verify));
        verify_checksum(&archive_path, &spec.checksum, &spec.url)?;
        on_event(PublishEvent::PhaseCompleted(
            PublishPhase::Verify,
            PhaseOutcome::Success {
                message: format!("Checksum {} verified", &spec.checksum[..12.min(spec.checksum.len())]),
            },
        ));

        // ── Unpack ──
        on_event(PublishEvent::PhaseStarted(PublishPhase::Unpack));
        let tree = staging_root.join("unpacked");
        std::fs::create_dir_all(&tree)?;
        unpack_archive(&archive_path, &tree)?;
        on_event(PublishEvent::PhaseCompleted(
            PublishPhase::Unpack,
            PhaseOutcome::Success {
                message: "Unpacked archive".into(),
            },
        ));

        // ── Upload ──
        on_event(PublishEvent::PhaseStarted(PublishPhase::Upload));
        let uploaded = self.upload_tree(&tree)?;
        on_event(PublishEvent::PhaseCompleted(
            PublishPhase::Upload,
            PhaseOutcome::Success {
                message: format!("Uploaded {uploaded} files"),
            },
        ));

        // ── Manifest ──
        on_event(PublishEvent::PhaseStarted(PublishPhase::Manifest));
        let update = self.update_manifest(version)?;
        on_event(PublishEvent::PhaseCompleted(
            PublishPhase::Manifest,
            PhaseOutcome::Success {
                message: if update.promoted {
                    format!("Manifest now advertises {version}")
                } else {
                    format!("Manifest lists {version} (newer release already advertised)")
                },
            },
        ));

        info!(
            platform = %spec.platform,
            uploaded,
            promoted = update.promoted,
            "artifact published"
        );
        Ok(PublishOutcome {
            version: version.clone(),
            platform: spec.platform.clone(),
            uploaded_files: uploaded,
            manifest: update,
        })
    }

    /// FETCH: stream the artifact into the staging directory.
    fn fetch(
        &self,
        spec: &ArtifactSpec,
        staging_root: &Utf8Path,
    ) -> PublishResult<(Utf8PathBuf, usize)> {
        let (bucket, key) =
            storage::parse_object_url(&spec.url).ok_or_else(|| PublishError::InvalidArtifactUrl {
                url: spec.url.clone(),
            })?;
        let bytes = self.store.get(&bucket, &key)?;
        let archive_path = staging_root.join("artifact.archive");
        std::fs::write(&archive_path, &bytes)?;
        debug!(%bucket, %key, len = bytes.len(), "staged artifact");
        Ok((archive_path, bytes.len()))
    }

    /// UPLOAD: publish every staged file under its relative path.
    ///
    /// Files go out in sorted path order so repeated runs touch the
    /// endpoint identically.
    fn upload_tree(&self, tree: &Utf8Path) -> PublishResult<usize> {
        let mut files = Vec::new();
        collect_files(tree, &mut files)?;
        files.sort();

        for path in &files {
            let key = path
                .strip_prefix(tree)
                .map_err(|_| std::io::Error::other("staged file escaped the staging tree"))?;
            self.store
                .put_file(&self.distribution.bucket, key.as_str(), path, true)?;
            debug!(key = %key, "uploaded");
        }
        Ok(files.len())
    }

    /// MANIFEST: fetch, mutate, and republish the manifest with fresh
    /// sidecar digests.
    ///
    /// Safe to repeat: promotion only moves the release pointer forward and
    /// the version list never gains duplicates.
    pub fn update_manifest(&self, version: &Version) -> PublishResult<ManifestUpdate> {
        let Distribution {
            bucket,
            manifest_key,
        } = &self.distribution;

        let current = self.store.get(bucket, manifest_key)?;
        let mut manifest = Manifest::parse(&String::from_utf8_lossy(&current))?;
        let update = manifest.apply_release(version, Utc::now());

        let body = manifest.render();
        self.store
            .put_bytes(bucket, manifest_key, body.as_bytes(), true)?;
        for (extension, digest) in crate::manifest::sidecar_digests(body.as_bytes()) {
            self.store.put_bytes(
                bucket,
                &format!("{manifest_key}.{extension}"),
                digest.as_bytes(),
                true,
            )?;
        }

        debug!(promoted = update.promoted, added = update.added, "manifest updated");
        Ok(update)
    }
}

// ──────────────────────────────────────────────
// Phase helpers
// ──────────────────────────────────────────────

/// VERIFY: compute SHA-256 over the staged bytes and compare.
fn verify_checksum(path: &Utf8Path, expected: &str, url: &str) -> PublishResult<()> {
    let bytes = std::fs::read(path)?;
    let actual = format!("{:x}", Sha256::digest(&bytes));
    if actual != expected {
        warn!(%url, expected, %actual, "checksum mismatch");
        return Err(PublishError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// UNPACK: expand the archive, preserving relative paths.
///
/// The artifact family ships tar archives (xz-compressed in production);
/// `tar -xf` auto-detects the compression.
fn unpack_archive(archive: &Utf8Path, dest: &Utf8Path) -> PublishResult<()> {
    let output = Command::new("tar")
        .args(["-xf", archive.as_str(), "-C", dest.as_str()])
        .output()
        .map_err(|e| PublishError::Unpack {
            message: format!("failed to run tar: {e}"),
        })?;
    if !output.status.success() {
        return Err(PublishError::Unpack {
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Recursively collect files under a directory.
fn collect_files(dir: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> std::io::Result<()> {
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(path, files)?;
        } else {
            files.push(path.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    const MANIFEST_KEY: &str = "releases/com/example/sdk/maven-metadata.xml";

    const MANIFEST: &str = "\
<?xml version=\"1.0\" encoding=\"utf-8\"?>
<metadata>
  <groupId>com.example.sdk</groupId>
  <artifactId>sdk</artifactId>
  <versioning>
    <release>1.6.0</release>
    <versions>
      <version>1.5.0</version>
      <version>1.6.0</version>
    </versions>
    <lastUpdated>20240301103055</lastUpdated>
  </versioning>
</metadata>
";

    fn distribution() -> Distribution {
        Distribution {
            bucket: "sdk-releases".into(),
            manifest_key: MANIFEST_KEY.into(),
        }
    }

    fn spec_for(url: &str, bytes: &[u8]) -> ArtifactSpec {
        ArtifactSpec {
            platform: "Maven".into(),
            url: url.into(),
            checksum: format!("{:x}", Sha256::digest(bytes)),
            commit: "f00dfeed".repeat(5),
        }
    }

    fn seeded_store(artifact: &[u8]) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("sdk-builds", "v1.7.0/sdk-1.7.0.tar", artifact);
        store.insert("sdk-releases", MANIFEST_KEY, MANIFEST.as_bytes());
        store
    }

    #[test]
    fn corrupted_artifact_aborts_before_upload() {
        let store = seeded_store(b"corrupted bytes");
        let publisher = Publisher::new(&store, distribution());

        let mut spec = spec_for(
            "https://sdk-builds.s3.amazonaws.com/v1.7.0/sdk-1.7.0.tar",
            b"the real bytes",
        );
        spec.checksum = format!("{:x}", Sha256::digest(b"the real bytes"));

        let err = publisher
            .publish_artifact(&spec, &Version::new(1, 7, 0), |_| {})
            .unwrap_err();
        assert!(matches!(err, PublishError::ChecksumMismatch { .. }));

        // Nothing was uploaded and the manifest is untouched.
        assert_eq!(store.keys_in("sdk-releases"), vec![MANIFEST_KEY.to_string()]);
        assert_eq!(
            store.bytes("sdk-releases", MANIFEST_KEY).unwrap(),
            MANIFEST.as_bytes()
        );
    }

    #[test]
    fn unrecognized_url_is_an_error() {
        let store = seeded_store(b"bytes");
        let publisher = Publisher::new(&store, distribution());
        let spec = spec_for("not-a-url", b"bytes");

        let err = publisher
            .publish_artifact(&spec, &Version::new(1, 7, 0), |_| {})
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidArtifactUrl { .. }));
    }

    #[test]
    fn update_manifest_promotes_newer_version() {
        let store = seeded_store(b"");
        let publisher = Publisher::new(&store, distribution());

        let update = publisher.update_manifest(&Version::new(1, 7, 0)).unwrap();
        assert!(update.promoted);
        assert!(update.added);

        let body = store.bytes("sdk-releases", MANIFEST_KEY).unwrap();
        let manifest = Manifest::parse(&String::from_utf8(body).unwrap()).unwrap();
        assert_eq!(manifest.release, Version::new(1, 7, 0));
    }

    #[test]
    fn update_manifest_keeps_newer_advertised_release() {
        let store = seeded_store(b"");
        let publisher = Publisher::new(&store, distribution());

        // 1.6.0 is already advertised; publishing 1.5.1 must not regress it.
        let update = publisher.update_manifest(&Version::new(1, 5, 1)).unwrap();
        assert!(!update.promoted);
        assert!(update.added);

        let body = store.bytes("sdk-releases", MANIFEST_KEY).unwrap();
        let manifest = Manifest::parse(&String::from_utf8(body).unwrap()).unwrap();
        assert_eq!(manifest.release, Version::new(1, 6, 0));
        assert!(manifest.versions.contains(&Version::new(1, 5, 1)));
    }

    #[test]
    fn update_manifest_twice_converges() {
        let store = seeded_store(b"");
        let publisher = Publisher::new(&store, distribution());
        let version = Version::new(1, 7, 0);

        publisher.update_manifest(&version).unwrap();
        let second = publisher.update_manifest(&version).unwrap();
        assert!(!second.promoted);
        assert!(!second.added);

        let body = store.bytes("sdk-releases", MANIFEST_KEY).unwrap();
        let manifest = Manifest::parse(&String::from_utf8(body).unwrap()).unwrap();
        let occurrences = manifest.versions.iter().filter(|v| **v == version).count();
        assert_eq!(occurrences, 1);
        assert_eq!(manifest.release, version);
    }

    #[test]
    fn update_manifest_writes_sidecar_digests() {
        let store = seeded_store(b"");
        let publisher = Publisher::new(&store, distribution());
        publisher.update_manifest(&Version::new(1, 7, 0)).unwrap();

        let body = store.bytes("sdk-releases", MANIFEST_KEY).unwrap();
        let md5 = store
            .bytes("sdk-releases", &format!("{MANIFEST_KEY}.md5"))
            .unwrap();
        let sha1 = store
            .bytes("sdk-releases", &format!("{MANIFEST_KEY}.sha1"))
            .unwrap();
        let expected = crate::manifest::sidecar_digests(&body);
        assert_eq!(md5, expected[0].1.as_bytes());
        assert_eq!(sha1, expected[1].1.as_bytes());
        assert!(store.is_public("sdk-releases", MANIFEST_KEY));
    }

    // Full-pipeline test with a real tar archive; skipped when tar isn't
    // installed.
    #[test]
    fn publish_artifact_uploads_unpacked_tree() {
        if which::which("tar").is_err() {
            return;
        }

        // Build a small archive: co/example/sdk/sdk.jar
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("payload");
        std::fs::create_dir_all(root.join("co/example/sdk")).unwrap();
        std::fs::write(root.join("co/example/sdk/sdk.jar"), b"jar bytes").unwrap();
        std::fs::write(root.join("co/example/sdk/sdk.pom"), b"pom bytes").unwrap();
        let archive = work.path().join("sdk.tar");
        let status = Command::new("tar")
            .args([
                "-cf",
                archive.to_str().unwrap(),
                "-C",
                root.to_str().unwrap(),
                "co",
            ])
            .status()
            .unwrap();
        assert!(status.success());
        let archive_bytes = std::fs::read(&archive).unwrap();

        let store = seeded_store(&archive_bytes);
        let publisher = Publisher::new(&store, distribution());
        let spec = spec_for(
            "https://sdk-builds.s3.amazonaws.com/v1.7.0/sdk-1.7.0.tar",
            &archive_bytes,
        );

        let mut phases = Vec::new();
        let outcome = publisher
            .publish_artifact(&spec, &Version::new(1, 7, 0), |event| {
                if let PublishEvent::PhaseStarted(phase) = event {
                    phases.push(phase);
                }
            })
            .unwrap();

        assert_eq!(outcome.uploaded_files, 2);
        assert!(outcome.manifest.promoted);
        assert_eq!(
            phases,
            vec![
                PublishPhase::Fetch,
                PublishPhase::Verify,
                PublishPhase::Unpack,
                PublishPhase::Upload,
                PublishPhase::Manifest,
            ]
        );

        // Files land under their relative paths, publicly readable.
        assert_eq!(
            store.bytes("sdk-releases", "co/example/sdk/sdk.jar").unwrap(),
            b"jar bytes"
        );
        assert!(store.is_public("sdk-releases", "co/example/sdk/sdk.jar"));

        // And the manifest now advertises the version.
        let body = store.bytes("sdk-releases", MANIFEST_KEY).unwrap();
        let manifest = Manifest::parse(&String::from_utf8(body).unwrap()).unwrap();
        assert_eq!(manifest.release, Version::new(1, 7, 0));

        // Re-running converges instead of duplicating.
        let again = publisher
            .publish_artifact(&spec, &Version::new(1, 7, 0), |_| {})
            .unwrap();
        assert!(!again.manifest.promoted);
        assert!(!again.manifest.added);
    }
}
