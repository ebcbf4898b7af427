//! Version specs: predicates over [`Version`]s.
//!
//! A spec is stored as a [`Ranges`] union plus the raw string it was parsed
//! from. The raw string is the canonical identity: two specs are equal iff
//! their strings are equal, matching requirement equality.
//!
//! Supported forms:
//! - wildcard: `*`, `any`
//! - exact: `1.2.3`, `=1.2.3`, or any opam version string
//! - comparators: `>=1.0.0 <2.0.0`, `>1.0`, `<=2`, `<3.0.0`
//! - caret: `^1.2.3` and tilde: `~1.2.3`
//! - partial / x-ranges: `1`, `1.2`, `1.x`, `1.2.x`
//! - unions: `^1.0 || ^2.0`

use crate::error::{Error, Result};
use crate::version::{OpamVersion, Precision, SemverVersion, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use version_ranges::Ranges;

/// A predicate over versions.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    ranges: Ranges<Version>,
    raw: Arc<str>,
}

impl VersionSpec {
    /// The wildcard spec matching every version.
    #[must_use]
    pub fn any() -> Self {
        Self {
            ranges: Ranges::full(),
            raw: Arc::from("*"),
        }
    }

    /// A spec matching exactly one version.
    #[must_use]
    pub fn exact(version: &Version) -> Self {
        Self {
            ranges: Ranges::singleton(version.clone()),
            raw: Arc::from(version.to_string()),
        }
    }

    /// Parse a spec string.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Ok(Self::any());
        }
        let mut union = Ranges::empty();
        for alternative in raw.split("||") {
            let alternative = alternative.trim();
            if alternative.is_empty() {
                return Err(Error::InvalidSpec(input.to_string()));
            }
            let mut conjunction = Ranges::full();
            for token in alternative.split_whitespace() {
                conjunction = conjunction.intersection(&parse_token(token)?);
            }
            union = union.union(&conjunction);
        }
        Ok(Self {
            ranges: union,
            raw: Arc::from(raw),
        })
    }

    /// Whether `version` satisfies this spec.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.ranges.contains(version)
    }

    /// The raw spec string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for VersionSpec {}

impl Hash for VersionSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for VersionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn parse_token(token: &str) -> Result<Ranges<Version>> {
    match token {
        "*" | "any" | "x" | "X" => Ok(Ranges::full()),
        _ => {
            if let Some(rest) = token.strip_prefix('^') {
                caret(token, rest)
            } else if let Some(rest) = token.strip_prefix('~') {
                tilde(token, rest)
            } else if let Some(rest) = token.strip_prefix(">=") {
                Ok(Ranges::higher_than(comparator_version(token, rest)?))
            } else if let Some(rest) = token.strip_prefix('>') {
                Ok(Ranges::strictly_higher_than(comparator_version(token, rest)?))
            } else if let Some(rest) = token.strip_prefix("<=") {
                Ok(Ranges::lower_than(comparator_version(token, rest)?))
            } else if let Some(rest) = token.strip_prefix('<') {
                Ok(Ranges::strictly_lower_than(comparator_version(token, rest)?))
            } else if let Some(rest) = token.strip_prefix('=') {
                Ok(Ranges::singleton(comparator_version(token, rest)?))
            } else {
                bare(token)
            }
        }
    }
}

/// Version for a comparator operand; partial semver fills with zeros, and
/// anything non-semver falls back to the opam family.
fn comparator_version(token: &str, operand: &str) -> Result<Version> {
    Version::parse(operand).map_err(|_| Error::InvalidSpec(token.to_string()))
}

/// Lower-bound version for caret/tilde, which only make sense for semver.
fn semver_operand(token: &str, operand: &str) -> Result<(SemverVersion, Precision)> {
    SemverVersion::parse_partial(operand).ok_or_else(|| Error::InvalidSpec(token.to_string()))
}

fn caret(token: &str, operand: &str) -> Result<Ranges<Version>> {
    let (lower, precision) = semver_operand(token, operand)?;
    let upper = if lower.major > 0 {
        lower.bump_major()
    } else {
        match precision {
            Precision::Major => lower.bump_major(),
            Precision::Minor | Precision::Patch if lower.minor > 0 => lower.bump_minor(),
            Precision::Minor => SemverVersion::new(0, 1, 0),
            Precision::Patch => lower.bump_patch(),
        }
    };
    Ok(Ranges::between(
        Version::Semver(lower),
        Version::Semver(upper),
    ))
}

fn tilde(token: &str, operand: &str) -> Result<Ranges<Version>> {
    let (lower, precision) = semver_operand(token, operand)?;
    let upper = match precision {
        Precision::Major => lower.bump_major(),
        Precision::Minor | Precision::Patch => lower.bump_minor(),
    };
    Ok(Ranges::between(
        Version::Semver(lower),
        Version::Semver(upper),
    ))
}

/// A bare token: an exact version, a partial version widened to a range, or
/// an x-range such as `1.2.x`.
fn bare(token: &str) -> Result<Ranges<Version>> {
    let mut trimmed = token;
    let mut wildcard = false;
    while let Some(rest) = trimmed
        .strip_suffix(".x")
        .or_else(|| trimmed.strip_suffix(".X"))
        .or_else(|| trimmed.strip_suffix(".*"))
    {
        trimmed = rest;
        wildcard = true;
    }
    if let Some((version, precision)) = SemverVersion::parse_partial(trimmed) {
        let range = match precision {
            Precision::Patch if !wildcard => Ranges::singleton(Version::Semver(version)),
            Precision::Patch => {
                return Err(Error::InvalidSpec(token.to_string()));
            }
            Precision::Major => Ranges::between(
                Version::Semver(version.clone()),
                Version::Semver(version.bump_major()),
            ),
            Precision::Minor => Ranges::between(
                Version::Semver(version.clone()),
                Version::Semver(version.bump_minor()),
            ),
        };
        return Ok(range);
    }
    if wildcard {
        return Err(Error::InvalidSpec(token.to_string()));
    }
    // Exact opam version
    let version = OpamVersion::new(token).map_err(|_| Error::InvalidSpec(token.to_string()))?;
    Ok(Ranges::singleton(Version::Opam(version)))
}
