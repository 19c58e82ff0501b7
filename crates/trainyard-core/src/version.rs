//! Release identifier model: parsing, formatting, and total ordering.
//!
//! A release identifier is `major.minor.patch` with an optional pre-release
//! label, e.g. `2.0.1` or `3.2.1-rc1`. Labels are restricted to lowercase
//! alphanumerics and dashes. Ordering puts every labeled version before its
//! unlabeled counterpart, so a train releases `2.0.0-rc1`, `2.0.0-rc2`,
//! then `2.0.0`.
//!
//! The comparison is written out as a single three-way function rather than
//! derived piecewise, so that equality and ordering cannot drift apart.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from version parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input did not match `major.minor.patch[-label]`.
    #[error("invalid version {input:?}: must be formatted like 2.0.1 or 3.2.1-rc1")]
    InvalidFormat {
        /// The offending input.
        input: String,
    },
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// A release identifier.
///
/// Immutable once constructed. An empty `label` means a final release;
/// a non-empty label (e.g. `rc1`) marks a pre-release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Pre-release label; empty for final releases.
    pub label: String,
}

impl Version {
    /// Construct a final release version.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            label: String::new(),
        }
    }

    /// Construct a pre-release version with the given label.
    pub fn with_label(major: u64, minor: u64, patch: u64, label: &str) -> Self {
        Self {
            major,
            minor,
            patch,
            label: label.to_string(),
        }
    }

    /// Parse a version string.
    ///
    /// Accepts exactly `major.minor.patch` or `major.minor.patch-label`
    /// where the label is one or more of `[a-z0-9-]`.
    pub fn parse(input: &str) -> VersionResult<Self> {
        let invalid = || VersionError::InvalidFormat {
            input: input.to_string(),
        };

        // Split off the label at the first dash after the numeric triple.
        let (numbers, label) = match input.split_once('-') {
            Some((head, tail)) => (head, tail),
            None => (input, ""),
        };

        let mut parts = numbers.split('.');
        let major = parse_component(parts.next()).ok_or_else(invalid)?;
        let minor = parse_component(parts.next()).ok_or_else(invalid)?;
        let patch = parse_component(parts.next()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        if !label.is_empty()
            && !label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(invalid());
        }
        // A trailing dash with nothing after it is not a pre-release.
        if label.is_empty() && input.ends_with('-') {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            label: label.to_string(),
        })
    }

    /// Whether this version carries a pre-release label.
    pub fn is_prerelease(&self) -> bool {
        !self.label.is_empty()
    }

    /// The integration branch for this version's release train: `"{major}.{minor}.x"`.
    ///
    /// Independent of patch and label: every release on a train shares a branch.
    pub fn release_branch(&self) -> String {
        format!("{}.{}.x", self.major, self.minor)
    }
}

/// Parse one numeric component: all-ASCII-digits, non-empty.
fn parse_component(part: Option<&str>) -> Option<u64> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.label.is_empty() {
            write!(f, "-{}", self.label)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    /// Total order over versions.
    ///
    /// The numeric triple decides first. On a tie, a labeled version sorts
    /// before an unlabeled one, and two labels compare as plain strings:
    /// `1.0.0 < 2.0.0-rc1 < 2.0.0-rc2 < 2.0.0`.
    fn cmp(&self, other: &Self) -> Ordering {
        let triple = (self.major, self.minor, self.patch).cmp(&(
            other.major,
            other.minor,
            other.patch,
        ));
        if triple != Ordering::Equal {
            return triple;
        }
        match (self.label.is_empty(), other.label.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.label.cmp(&other.label),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Serialize through the canonical string form so versions appear as
// `"2.0.0-rc1"` in JSON output rather than a four-field object.
impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
