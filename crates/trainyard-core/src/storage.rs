//! Object storage collaborator.
//!
//! The publication pipeline only needs three capabilities — get an object,
//! put a file, put raw bytes — so that's the whole interface. The
//! production implementation shells out to the `aws` CLI, which inherits
//! the operator's credential chain the same way the git module inherits
//! their SSH configuration.

use std::io::Read;
use std::process::Command;

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from object storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to execute the storage CLI.
    #[error("failed to run aws: {0}")]
    Exec(std::io::Error),

    /// The storage CLI returned a non-zero exit code.
    #[error("aws {command} failed for s3://{bucket}/{key}: {stderr}")]
    Command {
        /// The s3api subcommand that failed.
        command: String,
        /// Target bucket.
        bucket: String,
        /// Target key.
        key: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Local file I/O around a transfer failed.
    #[error("storage staging I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The object-storage capabilities the pipeline consumes.
///
/// Implementations must make `put_*` an idempotent overwrite: publishing
/// the same bytes to the same key twice is how interrupted runs recover.
pub trait ObjectStore {
    /// Fetch an object's bytes.
    fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Upload a local file to a key, optionally publicly fetchable.
    fn put_file(&self, bucket: &str, key: &str, path: &Utf8Path, public: bool)
    -> StorageResult<()>;

    /// Upload raw bytes to a key, optionally publicly fetchable.
    fn put_bytes(&self, bucket: &str, key: &str, bytes: &[u8], public: bool) -> StorageResult<()>;
}

/// Extract `(bucket, key)` from a virtual-hosted object URL.
///
/// `https://my-bucket.s3.amazonaws.com/path/to/object` → bucket is the
/// first host label, key is the path. Returns `None` when the URL doesn't
/// fit that shape.
pub fn parse_object_url(url: &str) -> Option<(String, String)> {
    let rest = url.split_once("//").map_or(url, |(_, rest)| rest);
    let (host, path) = rest.split_once('/')?;
    let bucket = host.split('.').next()?;
    if bucket.is_empty() || path.is_empty() {
        return None;
    }
    Some((bucket.to_string(), path.to_string()))
}

/// Object storage backed by the `aws` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsCli;

impl AwsCli {
    /// Check that the `aws` binary is on PATH.
    pub fn ensure_available() -> bool {
        which::which("aws").is_ok()
    }

    fn run(args: &[&str], command: &str, bucket: &str, key: &str) -> StorageResult<()> {
        let output = Command::new("aws")
            .args(args)
            .output()
            .map_err(StorageError::Exec)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StorageError::Command {
                command: command.to_string(),
                bucket: bucket.to_string(),
                key: key.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl ObjectStore for AwsCli {
    #[instrument(skip(self))]
    fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let staging = tempfile::NamedTempFile::new()?;
        let staging_path = staging.path().to_string_lossy().to_string();
        Self::run(
            &["s3api", "get-object", "--bucket", bucket, "--key", key, &staging_path],
            "get-object",
            bucket,
            key,
        )?;

        let mut bytes = Vec::new();
        staging.reopen()?.read_to_end(&mut bytes)?;
        debug!(bucket, key, len = bytes.len(), "fetched object");
        Ok(bytes)
    }

    #[instrument(skip(self))]
    fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Utf8Path,
        public: bool,
    ) -> StorageResult<()> {
        let body = format!("fileb://{path}");
        let mut args = vec![
            "s3api", "put-object", "--bucket", bucket, "--key", key, "--body", &body,
        ];
        if public {
            args.extend_from_slice(&["--acl", "public-read"]);
        }
        Self::run(&args, "put-object", bucket, key)?;
        debug!(bucket, key, %path, public, "uploaded file");
        Ok(())
    }

    #[instrument(skip(self, bytes))]
    fn put_bytes(&self, bucket: &str, key: &str, bytes: &[u8], public: bool) -> StorageResult<()> {
        use std::io::Write;

        let mut staging = tempfile::NamedTempFile::new()?;
        staging.write_all(bytes)?;
        staging.flush()?;
        let path = Utf8Path::from_path(staging.path()).ok_or_else(|| {
            StorageError::Io(std::io::Error::other("staging path is not valid UTF-8"))
        })?;
        self.put_file(bucket, key, path, public)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_virtual_hosted_url() {
        let (bucket, key) = parse_object_url(
            "https://sdk-builds.s3-accelerate.amazonaws.com/v2.0.0/sdk-2.0.0.tar.xz",
        )
        .unwrap();
        assert_eq!(bucket, "sdk-builds");
        assert_eq!(key, "v2.0.0/sdk-2.0.0.tar.xz");
    }

    #[test]
    fn parse_url_without_scheme() {
        let (bucket, key) = parse_object_url("sdk-builds.s3.amazonaws.com/key").unwrap();
        assert_eq!(bucket, "sdk-builds");
        assert_eq!(key, "key");
    }

    #[test]
    fn parse_url_rejects_missing_key() {
        assert!(parse_object_url("https://bucket.s3.amazonaws.com/").is_none());
        assert!(parse_object_url("https://bucket.s3.amazonaws.com").is_none());
        assert!(parse_object_url("").is_none());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = memory::MemoryStore::new();
        store.put_bytes("bucket", "key", b"hello", true).unwrap();
        assert_eq!(store.get("bucket", "key").unwrap(), b"hello");
        assert!(store.is_public("bucket", "key"));
    }

    #[test]
    fn memory_store_missing_key_errors() {
        let store = memory::MemoryStore::new();
        assert!(store.get("bucket", "absent").is_err());
    }
}
