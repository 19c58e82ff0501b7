//! Git operations for the release train.
//!
//! Shells out to `git` for all operations. This ensures we inherit the
//! operator's SSH keys, GPG signing, and other configuration. Every
//! function targets an explicit mirror directory via `git -C`; nothing
//! depends on the process working directory.

use std::process::Command;

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "fetch").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// A push was rejected because the remote has diverged.
    ///
    /// Surfaced to the operator; never resolved by force-pushing.
    #[error("push rejected as non-fast-forward: {stderr}")]
    NonFastForward {
        /// Captured stderr from the rejected push.
        stderr: String,
    },
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Check that the `git` binary is on PATH.
pub fn ensure_available() -> bool {
    which::which("git").is_ok()
}

/// Idempotently bring a local mirror of `url` to the tip of `branch`.
///
/// Clones if the directory is absent (with a notes refspec so commit
/// annotations replicate), otherwise fetches everything. Then checks the
/// branch out and rebases onto the remote tip: the mirror is disposable and
/// must always end up bit-identical to upstream, which a merge would not
/// guarantee.
#[instrument(skip(url))]
pub fn sync_mirror(url: &str, dir: &Utf8Path, branch: &str) -> GitResult<()> {
    if dir.exists() {
        git(dir, &["fetch", "--all", "--quiet"])?;
    } else {
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        git_anywhere(&[
            "clone",
            url,
            "--config",
            "remote.origin.fetch=+refs/notes/*:refs/notes/*",
            dir.as_str(),
        ])?;
        // The refspec from --config isn't honored on the initial clone, so
        // fetch once more to pick up the notes refs.
        git(dir, &["fetch", "--quiet"])?;
    }

    git(dir, &["checkout", branch, "--quiet"])?;
    git(dir, &["rebase", &format!("origin/{branch}"), "--quiet"])?;
    debug!(%dir, branch, "mirror in sync");
    Ok(())
}

/// Resolve a committish to a full object hash.
#[instrument]
pub fn rev_parse(dir: &Utf8Path, committish: &str) -> GitResult<String> {
    let output = git(dir, &["rev-parse", committish])?;
    Ok(output.trim().to_string())
}

/// Read the commit annotation stored under `notes_ref` for a committish.
#[instrument]
pub fn show_note(dir: &Utf8Path, notes_ref: &str, committish: &str) -> GitResult<String> {
    let output = git(dir, &["notes", "--ref", notes_ref, "show", committish])?;
    Ok(output.trim().to_string())
}

/// The commit a tag points at, or `None` if the tag doesn't exist.
///
/// Annotated tags are peeled to the tagged commit.
#[instrument]
pub fn tag_target(dir: &Utf8Path, tag: &str) -> GitResult<Option<String>> {
    match git(dir, &["rev-parse", &format!("{tag}^{{commit}}")]) {
        Ok(output) => Ok(Some(output.trim().to_string())),
        Err(GitError::Command { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create an annotated tag at a committish.
#[instrument(skip(message))]
pub fn create_annotated_tag(
    dir: &Utf8Path,
    tag: &str,
    message: &str,
    committish: &str,
) -> GitResult<()> {
    git(dir, &["tag", "--message", message, tag, committish])?;
    debug!(tag, committish, "created annotated tag");
    Ok(())
}

/// Push local refs to the shared remote.
///
/// With `tags`, pushes tags instead of branch heads. A diverged remote
/// surfaces as [`GitError::NonFastForward`].
#[instrument]
pub fn push(dir: &Utf8Path, tags: bool) -> GitResult<()> {
    let args: &[&str] = if tags { &["push", "--tags"] } else { &["push"] };
    match git(dir, args) {
        Ok(_) => Ok(()),
        Err(GitError::Command { stderr, .. })
            if stderr.contains("non-fast-forward") || stderr.contains("fetch first") =>
        {
            Err(GitError::NonFastForward { stderr })
        }
        Err(e) => Err(e),
    }
}

/// Stage a path.
pub fn add(dir: &Utf8Path, path: &str) -> GitResult<()> {
    git(dir, &["add", path])?;
    Ok(())
}

/// Commit staged changes and return the new commit hash.
#[instrument(skip(message))]
pub fn commit(dir: &Utf8Path, message: &str) -> GitResult<String> {
    git(dir, &["commit", "-m", message])?;
    let hash = rev_parse(dir, "HEAD")?;
    debug!(%hash, "created commit");
    Ok(hash)
}

/// Run a git command in a mirror directory and return its stdout.
fn git(dir: &Utf8Path, args: &[&str]) -> GitResult<String> {
    let mut full: Vec<&str> = vec!["-C", dir.as_str()];
    full.extend_from_slice(args);
    git_anywhere(&full)
}

/// Run a git command and return its stdout.
fn git_anywhere(args: &[&str]) -> GitResult<String> {
    let output = Command::new("git").args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = args
            .iter()
            .find(|arg| !arg.starts_with('-') && !arg.contains('/'))
            .copied()
            .unwrap_or("")
            .to_string();
        Err(GitError::Command { command, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    // Tests that need a repository create one in a tempdir and skip
    // gracefully when git isn't installed, mirroring how development
    // environments without the full toolchain still run the suite.

    fn init_repo() -> Option<(tempfile::TempDir, Utf8PathBuf)> {
        if !ensure_available() {
            return None;
        }
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        git(&dir, &["init", "--quiet"]).unwrap();
        git(&dir, &["config", "user.email", "test@example.com"]).unwrap();
        git(&dir, &["config", "user.name", "Test"]).unwrap();
        Some((tmp, dir))
    }

    #[test]
    fn commit_and_rev_parse() {
        let Some((_tmp, dir)) = init_repo() else {
            return;
        };
        std::fs::write(dir.join("file.txt"), "hello").unwrap();
        add(&dir, "file.txt").unwrap();
        let hash = commit(&dir, "initial").unwrap();
        assert_eq!(hash.len(), 40);
        assert_eq!(rev_parse(&dir, "HEAD").unwrap(), hash);
    }

    #[test]
    fn tag_target_absent_then_present() {
        let Some((_tmp, dir)) = init_repo() else {
            return;
        };
        std::fs::write(dir.join("file.txt"), "hello").unwrap();
        add(&dir, "file.txt").unwrap();
        let hash = commit(&dir, "initial").unwrap();

        assert_eq!(tag_target(&dir, "v1.0.0").unwrap(), None);
        create_annotated_tag(&dir, "v1.0.0", "Release v1.0.0", &hash).unwrap();
        assert_eq!(tag_target(&dir, "v1.0.0").unwrap(), Some(hash));
    }

    #[test]
    fn command_error_captures_subcommand() {
        let Some((_tmp, dir)) = init_repo() else {
            return;
        };
        let err = git(&dir, &["not-a-real-subcommand"]).unwrap_err();
        match err {
            GitError::Command { command, .. } => assert_eq!(command, "not-a-real-subcommand"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sync_mirror_from_local_remote() {
        let Some((_tmp, origin)) = init_repo() else {
            return;
        };
        std::fs::write(origin.join("file.txt"), "hello").unwrap();
        add(&origin, "file.txt").unwrap();
        commit(&origin, "initial").unwrap();
        git(&origin, &["branch", "--move", "1.0.x"]).unwrap();

        let mirror_tmp = tempfile::tempdir().unwrap();
        let mirror = Utf8PathBuf::from_path_buf(mirror_tmp.path().join("mirror")).unwrap();

        // First sync clones, second fetches — both land on the branch tip.
        sync_mirror(origin.as_str(), &mirror, "1.0.x").unwrap();
        let first = rev_parse(&mirror, "HEAD").unwrap();
        sync_mirror(origin.as_str(), &mirror, "1.0.x").unwrap();
        let second = rev_parse(&mirror, "HEAD").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, rev_parse(&origin, "HEAD").unwrap());
    }

    #[test]
    fn show_note_reads_commit_annotation() {
        let Some((_tmp, dir)) = init_repo() else {
            return;
        };
        std::fs::write(dir.join("file.txt"), "hello").unwrap();
        add(&dir, "file.txt").unwrap();
        let hash = commit(&dir, "initial").unwrap();
        git(
            &dir,
            &[
                "notes",
                "--ref",
                "artifacts",
                "add",
                "-m",
                "Sdk/url: https://example.com/sdk.tar.xz",
                &hash,
            ],
        )
        .unwrap();

        let note = show_note(&dir, "artifacts", &hash).unwrap();
        assert_eq!(note, "Sdk/url: https://example.com/sdk.tar.xz");
    }
}
