//! Version labels derived from repository references.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Name of the version served from the working tree.
pub const LIVE: &str = "live";

static LEADING_V: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v[0-9]+").expect("valid regex"));

/// Where a version comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    Live,
    Tag,
    Branch,
    Other,
}

/// A named, servable version of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    /// Display name, e.g. `1.2.0`, `dev-main` or `live`.
    pub name: String,
    /// Full reference name, e.g. `refs/tags/v1.2.0`.
    pub reference: String,
    /// Commit the reference points to, hex encoded.
    pub target: String,
    pub kind: VersionKind,
    #[serde(skip)]
    parsed: Option<semver::Version>,
}

impl Version {
    /// Build a version from a full reference name and its target commit.
    #[must_use]
    pub fn from_reference(reference: &str, target: impl Into<String>) -> Self {
        let (kind, name) = if let Some(short) = reference.strip_prefix("refs/tags/") {
            // Only strip the v of version-like tags, not of other v-words.
            let name = if LEADING_V.is_match(short) {
                short.trim_start_matches('v').to_string()
            } else {
                short.to_string()
            };
            (VersionKind::Tag, name)
        } else if let Some(short) = reference.strip_prefix("refs/heads/") {
            (VersionKind::Branch, format!("dev-{short}"))
        } else {
            (VersionKind::Other, short_name(reference).to_string())
        };

        Self {
            parsed: semver::Version::parse(&name).ok(),
            name,
            reference: reference.to_string(),
            target: target.into(),
            kind,
        }
    }

    /// The working tree version, at the given reference.
    #[must_use]
    pub fn live(reference: &str, target: impl Into<String>) -> Self {
        Self {
            name: LIVE.to_string(),
            reference: reference.to_string(),
            target: target.into(),
            kind: VersionKind::Live,
            parsed: None,
        }
    }

    /// Parsed semantic version, when the name is compliant.
    #[must_use]
    pub const fn semver(&self) -> Option<&semver::Version> {
        self.parsed.as_ref()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.kind == VersionKind::Live
    }

    /// Compare for display: live first, then tags (newest first), then
    /// branches.
    #[must_use]
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        fn rank(kind: VersionKind) -> u8 {
            match kind {
                VersionKind::Live => 0,
                VersionKind::Tag => 1,
                VersionKind::Branch | VersionKind::Other => 2,
            }
        }
        rank(self.kind)
            .cmp(&rank(other.kind))
            .then_with(|| match (self.kind, other.kind, &self.parsed, &other.parsed) {
                (VersionKind::Tag, VersionKind::Tag, Some(a), Some(b)) => b.cmp(a),
                _ => other.name.len().cmp(&self.name.len()),
            })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn short_name(reference: &str) -> &str {
    reference
        .strip_prefix("refs/remotes/")
        .or_else(|| reference.strip_prefix("refs/"))
        .unwrap_or(reference)
}

/// Sort versions for display, see [`Version::display_cmp`].
pub fn sort(versions: &mut [Version]) {
    versions.sort_by(Version::display_cmp);
}

/// Versions for which `f` returns true.
#[must_use]
pub fn filter(versions: &[Version], f: impl Fn(&Version) -> bool) -> Vec<Version> {
    versions.iter().filter(|v| f(v)).cloned().collect()
}

/// Names of the versions, in order.
#[must_use]
pub fn names(versions: &[Version]) -> Vec<String> {
    versions.iter().map(|v| v.name.clone()).collect()
}
