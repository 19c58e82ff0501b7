//! Changelog document parsing and release-entry merging.
//!
//! The changelog is UTF-8 text: a fixed-size preamble, then one section per
//! release. A section starts with a header line `VERSION - YYYY-MM-DD`,
//! optionally followed by an underline of `=` or `-` characters (pure
//! decoration), followed by free-form Markdown until the next header.
//!
//! Cutting a new release inserts a dated header directly under the preamble
//! with the collected per-repository change fragments, leaving the existing
//! body untouched. Fragment order follows the caller's enumeration, so
//! repeated cuts over identical inputs are byte-identical.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::version::Version;

/// Number of leading lines that form the document preamble.
///
/// These are preserved verbatim when cutting a release; headers are only
/// recognized below them.
pub const PREAMBLE_LINES: usize = 5;

/// Errors from changelog operations.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// No release header matched the requested version.
    #[error("version {version} has no entry in the changelog")]
    VersionNotInChangelog {
        /// The version that was looked up.
        version: Version,
    },

    /// A date string did not match `YYYY-MM-DD`.
    #[error("invalid date {input:?}: must be formatted like 2024-03-01")]
    InvalidDate {
        /// The offending input.
        input: String,
    },
}

/// Result alias for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// One historical entry in the changelog.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Release {
    /// The released version.
    pub version: Version,
    /// The date the release was cut.
    pub released_at: NaiveDate,
    /// Free-form change text, underlines stripped.
    pub changes: String,
}

/// A pending-change fragment collected from one source repository.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChangeFragment {
    /// The repository the fragment came from.
    pub origin: String,
    /// The fragment body, as read from the pending-changes file.
    pub body: String,
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> ChangelogResult<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| ChangelogError::InvalidDate {
        input: input.to_string(),
    })
}

/// Try to interpret a line as a release header: `VERSION - YYYY-MM-DD`.
///
/// Lines that don't fit the shape are body text, not errors — the parser
/// trusts the document.
fn parse_header(line: &str) -> Option<(Version, NaiveDate)> {
    let (version_str, date_str) = line.split_once(" - ")?;
    let version = Version::parse(version_str).ok()?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
    Some((version, date))
}

/// A pure underline of `=` / `-` characters (decoration under a header).
fn is_underline(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b == b'=' || b == b'-')
}

/// Parse a changelog document into its release entries, in document order.
///
/// Lines before the first header are preamble and belong to no release.
pub fn parse(document: &str) -> Vec<Release> {
    let mut releases = Vec::new();
    let mut current: Option<(Version, NaiveDate)> = None;
    let mut changes: Vec<&str> = Vec::new();

    for line in document.lines() {
        let line = line.trim_end();
        if let Some(header) = parse_header(line) {
            if let Some((version, released_at)) = current.take() {
                releases.push(Release {
                    version,
                    released_at,
                    changes: changes.join("\n"),
                });
                changes.clear();
            }
            current = Some(header);
            continue;
        }
        if current.is_none() {
            // Preamble
            continue;
        }
        if is_underline(line) {
            continue;
        }
        changes.push(line);
    }
    if let Some((version, released_at)) = current {
        releases.push(Release {
            version,
            released_at,
            changes: changes.join("\n"),
        });
    }

    debug!(count = releases.len(), "parsed changelog");
    releases
}

/// Find the release date recorded for a version.
///
/// This is a hard precondition for archive timestamping: a missing entry is
/// an error, never a defaulted date.
pub fn release_date(document: &str, version: &Version) -> ChangelogResult<NaiveDate> {
    parse(document)
        .into_iter()
        .find(|release| release.version == *version)
        .map(|release| release.released_at)
        .ok_or_else(|| ChangelogError::VersionNotInChangelog {
            version: version.clone(),
        })
}

/// Cut a new release entry into the document.
///
/// The first [`PREAMBLE_LINES`] lines are preserved verbatim, then the new
/// dated header with an `=` underline, then each non-empty fragment labeled
/// by its origin, then the previous body unchanged. Fragments are emitted in
/// the order given; callers enumerate repositories from configuration (a
/// fixed list, never map iteration) so output is deterministic.
pub fn cut_release(
    document: &str,
    version: &Version,
    date: NaiveDate,
    fragments: &[ChangeFragment],
) -> String {
    let mut line_starts = document
        .char_indices()
        .filter(|(_, c)| *c == '\n')
        .map(|(i, _)| i + 1);
    let split_at = line_starts
        .nth(PREAMBLE_LINES - 1)
        .unwrap_or(document.len());
    let (preamble, rest) = document.split_at(split_at);

    let header = format!("{version} - {}", date.format("%Y-%m-%d"));
    let merged: Vec<String> = fragments
        .iter()
        .filter(|fragment| !fragment.body.trim().is_empty())
        .map(|fragment| format!(">>>> {} changes: <<<<\n{}", fragment.origin, fragment.body))
        .collect();

    let mut out = String::with_capacity(document.len() + 256);
    out.push_str(preamble);
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"=".repeat(header.len()));
    out.push_str("\n\n");
    out.push_str(&merged.join("\n"));
    out.push_str("\n\n");
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Changelog

All notable SDK changes, newest first.


2.0.0 - 2024-03-01
==================

>>>> core changes: <<<<
- New rendering pipeline

1.9.2 - 2024-01-15
------------------
- Fixed crash on resume
";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_releases_in_document_order() {
        let releases = parse(SAMPLE);
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].version, Version::new(2, 0, 0));
        assert_eq!(releases[0].released_at, date("2024-03-01"));
        assert_eq!(releases[1].version, Version::new(1, 9, 2));
        assert_eq!(releases[1].released_at, date("2024-01-15"));
    }

    #[test]
    fn underlines_are_not_changes() {
        let releases = parse(SAMPLE);
        assert!(!releases[0].changes.contains('='));
        assert!(releases[1].changes.starts_with("- Fixed crash"));
    }

    #[test]
    fn preamble_lines_belong_to_no_release() {
        let releases = parse(SAMPLE);
        assert!(!releases[0].changes.contains("# Changelog"));
    }

    #[test]
    fn prerelease_headers_parse() {
        let doc = "a\nb\nc\nd\ne\n2.0.0-rc1 - 2024-02-20\n- candidate\n";
        let releases = parse(doc);
        assert_eq!(releases.len(), 1);
        assert_eq!(
            releases[0].version,
            Version::with_label(2, 0, 0, "rc1")
        );
    }

    #[test]
    fn non_header_dash_lines_are_body() {
        // "some - text" is not version-shaped, so it stays body text.
        let doc = "a\nb\nc\nd\ne\n1.0.0 - 2024-01-01\nfoo - bar\n";
        let releases = parse(doc);
        assert_eq!(releases[0].changes, "foo - bar");
    }

    #[test]
    fn release_date_found() {
        let found = release_date(SAMPLE, &Version::new(1, 9, 2)).unwrap();
        assert_eq!(found, date("2024-01-15"));
    }

    #[test]
    fn release_date_missing_is_an_error() {
        let err = release_date(SAMPLE, &Version::new(9, 9, 9)).unwrap_err();
        assert!(matches!(
            err,
            ChangelogError::VersionNotInChangelog { .. }
        ));
    }

    #[test]
    fn cut_release_preserves_preamble_and_body() {
        let fragments = vec![
            ChangeFragment {
                origin: "core".into(),
                body: "- Faster startup\n".into(),
            },
            ChangeFragment {
                origin: "wrapper".into(),
                body: "- Updated bindings\n".into(),
            },
        ];
        let out = cut_release(SAMPLE, &Version::new(2, 1, 0), date("2024-04-02"), &fragments);

        // Preamble verbatim at the top.
        assert!(out.starts_with("# Changelog\n\nAll notable SDK changes, newest first.\n\n\n"));
        // New header with matching underline directly below it.
        let header = "2.1.0 - 2024-04-02";
        assert!(out.contains(&format!("{header}\n{}\n", "=".repeat(header.len()))));
        // Fragments labeled in the order given.
        let core_at = out.find(">>>> core changes: <<<<").unwrap();
        let wrapper_at = out.find(">>>> wrapper changes: <<<<").unwrap();
        assert!(core_at < wrapper_at);
        // Everything that was in the document is still there.
        assert!(out.ends_with("2.0.0 - 2024-03-01\n==================\n\n>>>> core changes: <<<<\n- New rendering pipeline\n\n1.9.2 - 2024-01-15\n------------------\n- Fixed crash on resume\n"));
    }

    #[test]
    fn cut_release_is_deterministic() {
        let fragments = vec![ChangeFragment {
            origin: "core".into(),
            body: "- One change\n".into(),
        }];
        let first = cut_release(SAMPLE, &Version::new(2, 1, 0), date("2024-04-02"), &fragments);
        let second = cut_release(SAMPLE, &Version::new(2, 1, 0), date("2024-04-02"), &fragments);
        assert_eq!(first, second);
    }

    #[test]
    fn cut_release_skips_empty_fragments() {
        let fragments = vec![
            ChangeFragment {
                origin: "core".into(),
                body: "- Real change\n".into(),
            },
            ChangeFragment {
                origin: "wrapper".into(),
                body: "  \n".into(),
            },
        ];
        let out = cut_release(SAMPLE, &Version::new(2, 1, 0), date("2024-04-02"), &fragments);
        assert!(out.contains(">>>> core changes: <<<<"));
        assert!(!out.contains(">>>> wrapper changes: <<<<"));
    }

    #[test]
    fn cut_then_parse_sees_the_new_entry_first() {
        let fragments = vec![ChangeFragment {
            origin: "core".into(),
            body: "- A change".into(),
        }];
        let out = cut_release(SAMPLE, &Version::new(2, 1, 0), date("2024-04-02"), &fragments);
        let releases = parse(&out);
        assert_eq!(releases.len(), 3);
        assert_eq!(releases[0].version, Version::new(2, 1, 0));
        assert!(releases[0].changes.contains(">>>> core changes: <<<<"));
    }

    #[test]
    fn parse_date_validates() {
        assert!(parse_date("2024-04-02").is_ok());
        assert!(parse_date("04/02/2024").is_err());
        assert!(parse_date("not-a-date").is_err());
    }
}
