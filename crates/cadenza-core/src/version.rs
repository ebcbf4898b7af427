//! Version handling for the two version families the registry serves.
//!
//! Native-ecosystem packages carry semver-style versions (`1.2.3`,
//! `2.0.0-beta.1`), while packages bridged from opam carry free-form version
//! strings (`8.2+flambda`, `1.0~beta1`) ordered the way opam orders them:
//! alternating letter/digit segments, digit runs compared numerically, and
//! `~` sorting before everything including end-of-string.
//!
//! [`Version`] is the closed sum of both. All semver versions order before
//! all opam versions so the total order required by the solver holds even
//! for the (pathological) case of a package mixing both families.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:-([0-9A-Za-z][0-9A-Za-z.-]*))?(?:\+[0-9A-Za-z.-]+)?$")
        .unwrap()
});

/// How many numeric components a partially written semver string carried.
///
/// `"1"` parses at [`Precision::Major`], `"1.2"` at [`Precision::Minor`] and
/// `"1.2.3"` at [`Precision::Patch`]. Version specs use this to widen bare
/// partial versions into ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    /// Only the major component was written.
    Major,
    /// Major and minor components were written.
    Minor,
    /// All three components were written.
    Patch,
}

/// Pre-release identifier component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreReleaseId {
    /// Numeric identifier, compared numerically.
    Numeric(u64),
    /// Alphanumeric identifier, compared lexicographically.
    Alpha(Arc<str>),
}

impl PartialOrd for PreReleaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PreReleaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Alpha(a), Self::Alpha(b)) => a.cmp(b),
            // Numeric identifiers have lower precedence than alphanumeric ones
            (Self::Numeric(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for PreReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alpha(s) => write!(f, "{s}"),
        }
    }
}

/// A semver-style version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemverVersion {
    /// Major version component.
    pub major: u64,
    /// Minor version component.
    pub minor: u64,
    /// Patch version component.
    pub patch: u64,
    /// Pre-release identifiers; empty for a release version.
    pub prerelease: Vec<PreReleaseId>,
}

impl SemverVersion {
    /// Create a release version with no pre-release identifiers.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
        }
    }

    /// Parse a complete semver version. Missing minor/patch components are
    /// filled with zero; build metadata is accepted and discarded.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        Self::parse_partial(input).map(|(version, _)| version)
    }

    /// Parse a possibly partial semver version, reporting how many numeric
    /// components were present.
    pub(crate) fn parse_partial(input: &str) -> Option<(Self, Precision)> {
        let captures = SEMVER_RE.captures(input.trim())?;
        let component = |i: usize| -> Option<u64> {
            captures.get(i).and_then(|m| m.as_str().parse().ok())
        };
        let major = component(1)?;
        let minor = component(2);
        let patch = component(3);
        let precision = match (minor, patch) {
            (None, _) => Precision::Major,
            (Some(_), None) => Precision::Minor,
            (Some(_), Some(_)) => Precision::Patch,
        };
        let prerelease = match captures.get(4) {
            None => Vec::new(),
            Some(m) => m
                .as_str()
                .split('.')
                .map(|id| {
                    if id.is_empty() {
                        return None;
                    }
                    // Identifiers with leading zeros are alphanumeric per semver
                    if id.chars().all(|c| c.is_ascii_digit()) && (id == "0" || !id.starts_with('0'))
                    {
                        id.parse().map(PreReleaseId::Numeric).ok()
                    } else {
                        Some(PreReleaseId::Alpha(Arc::from(id)))
                    }
                })
                .collect::<Option<Vec<_>>>()?,
        };
        Some((
            Self {
                major,
                minor: minor.unwrap_or(0),
                patch: patch.unwrap_or(0),
                prerelease,
            },
            precision,
        ))
    }

    /// Whether this is a pre-release version.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// The next major release: `1.4.2 -> 2.0.0`.
    #[must_use]
    pub const fn bump_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    /// The next minor release: `1.4.2 -> 1.5.0`.
    #[must_use]
    pub const fn bump_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// The next patch release: `1.4.2 -> 1.4.3`.
    #[must_use]
    pub const fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl PartialOrd for SemverVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemverVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release sorts above any of its pre-releases
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.prerelease.cmp(&other.prerelease),
            })
    }
}

impl fmt::Display for SemverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, id) in self.prerelease.iter().enumerate() {
            write!(f, "{}{id}", if i == 0 { '-' } else { '.' })?;
        }
        Ok(())
    }
}

/// An opam-style version string.
///
/// Ordering follows opam's segment comparison. The raw string is preserved
/// verbatim; equality is structural on it. Versions that compare equal
/// segment-wise but differ textually (`1.0` vs `1.00`) are tie-broken by the
/// raw string so the order stays consistent with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpamVersion(Arc<str>);

impl OpamVersion {
    /// Create an opam version, validating the character set.
    pub fn new(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty()
            || !input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.' | '~' | ':'))
        {
            return Err(Error::InvalidVersion(input.to_string()));
        }
        Ok(Self(Arc::from(input)))
    }

    /// The raw version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Weight of a byte in opam segment comparison. Digits and end-of-string
/// weigh zero, `~` less than that, letters by code point, and everything
/// else above all letters.
const fn opam_char_order(c: u8) -> i32 {
    match c {
        b'~' => -1,
        c if c.is_ascii_digit() => 0,
        c if c.is_ascii_alphabetic() => c as i32,
        c => c as i32 + 256,
    }
}

/// Opam/Debian-style segment comparison over raw version strings.
fn opam_compare(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        // Non-digit run, compared byte-wise by weight
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let wa = if i < a.len() { opam_char_order(a[i]) } else { 0 };
            let wb = if j < b.len() { opam_char_order(b[j]) } else { 0 };
            if wa != wb {
                return wa.cmp(&wb);
            }
            i += 1;
            j += 1;
        }
        // Digit run, compared numerically: strip zeros, longer run wins,
        // equal-length runs compare lexicographically
        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }
        let mut first_diff = Ordering::Equal;
        while i < a.len() && j < b.len() && a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

impl PartialOrd for OpamVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpamVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        opam_compare(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for OpamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A package version, from either version family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// Semver-style version.
    Semver(SemverVersion),
    /// Opam-style version.
    Opam(OpamVersion),
}

impl Version {
    /// Parse a version string.
    ///
    /// An `opam:` prefix forces the opam family. Otherwise semver-shaped
    /// strings parse as semver and anything else falls back to the opam
    /// family, so parsing is total over registry version strings.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidVersion(input.to_string()));
        }
        if let Some(rest) = input.strip_prefix("opam:") {
            return OpamVersion::new(rest).map(Self::Opam);
        }
        match SemverVersion::parse(input) {
            Some(version) => Ok(Self::Semver(version)),
            None => OpamVersion::new(input).map(Self::Opam),
        }
    }

    /// Shorthand for a semver release version.
    #[must_use]
    pub const fn semver(major: u64, minor: u64, patch: u64) -> Self {
        Self::Semver(SemverVersion::new(major, minor, patch))
    }

    /// Whether this is a semver pre-release.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        match self {
            Self::Semver(v) => v.is_prerelease(),
            Self::Opam(_) => false,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Semver(a), Self::Semver(b)) => a.cmp(b),
            (Self::Opam(a), Self::Opam(b)) => a.cmp(b),
            // All semver versions order before all opam versions
            (Self::Semver(_), Self::Opam(_)) => Ordering::Less,
            (Self::Opam(_), Self::Semver(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semver(v) => write!(f, "{v}"),
            Self::Opam(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod semver {
        use super::*;
        use pretty_assertions::assert_eq;
        use test_case::test_case;

        #[test]
        fn parse_release() {
            let v = SemverVersion::parse("1.2.3").unwrap();
            assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
            assert!(v.prerelease.is_empty());
        }

        #[test]
        fn parse_fills_missing_components() {
            assert_eq!(SemverVersion::parse("2").unwrap(), SemverVersion::new(2, 0, 0));
            assert_eq!(SemverVersion::parse("2.1").unwrap(), SemverVersion::new(2, 1, 0));
        }

        #[test]
        fn parse_prerelease_and_build_metadata() {
            let v = SemverVersion::parse("1.0.0-beta.2+build.5").unwrap();
            assert_eq!(
                v.prerelease,
                vec![
                    PreReleaseId::Alpha(Arc::from("beta")),
                    PreReleaseId::Numeric(2)
                ]
            );
            assert_eq!(v.to_string(), "1.0.0-beta.2");
        }

        #[test]
        fn parse_v_prefix() {
            assert_eq!(SemverVersion::parse("v1.2.3").unwrap(), SemverVersion::new(1, 2, 3));
        }

        #[test_case("", "not a version")]
        #[test_case("1.2.3.4", "too many components")]
        #[test_case("x.y.z", "letters")]
        fn parse_invalid(input: &str, _reason: &str) {
            assert_eq!(SemverVersion::parse(input), None);
        }

        #[test]
        fn release_sorts_above_prerelease() {
            let release = SemverVersion::parse("1.0.0").unwrap();
            let pre = SemverVersion::parse("1.0.0-rc.1").unwrap();
            assert!(pre < release);
        }

        #[test]
        fn prerelease_ordering() {
            let order = ["1.0.0-alpha", "1.0.0-alpha.1", "1.0.0-alpha.beta", "1.0.0-beta", "1.0.0-beta.2", "1.0.0-beta.11", "1.0.0-rc.1", "1.0.0"];
            let parsed: Vec<_> = order.iter().map(|s| SemverVersion::parse(s).unwrap()).collect();
            for pair in parsed.windows(2) {
                assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
            }
        }
    }

    mod opam {
        use super::*;
        use pretty_assertions::assert_eq;
        use test_case::test_case;

        #[test_case("1.0", "2.0")]
        #[test_case("1.9", "1.10"; "numeric not lexicographic")]
        #[test_case("1.0~beta", "1.0"; "tilde sorts before release")]
        #[test_case("1.0~beta1", "1.0~beta2")]
        #[test_case("1.0", "1.0a"; "trailing letters sort after")]
        #[test_case("1.0a", "1.0.1")]
        #[test_case("8.1", "8.2+flambda")]
        fn ordering(lower: &str, higher: &str) {
            let lo = OpamVersion::new(lower).unwrap();
            let hi = OpamVersion::new(higher).unwrap();
            assert!(lo < hi, "{lower} < {higher}");
        }

        #[test]
        fn equal_segments_tie_break_on_raw() {
            let a = OpamVersion::new("1.0").unwrap();
            let b = OpamVersion::new("1.00").unwrap();
            assert_ne!(a, b);
            assert_ne!(a.cmp(&b), Ordering::Equal);
        }

        #[test]
        fn rejects_bad_characters() {
            assert!(OpamVersion::new("1.0 beta").is_err());
            assert!(OpamVersion::new("").is_err());
        }
    }

    mod version {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn parse_prefers_semver() {
            assert_eq!(Version::parse("1.2.3").unwrap(), Version::semver(1, 2, 3));
        }

        #[test]
        fn parse_falls_back_to_opam() {
            let v = Version::parse("1.0~beta1").unwrap();
            assert!(matches!(v, Version::Opam(_)));
        }

        #[test]
        fn opam_prefix_forces_family() {
            let v = Version::parse("opam:1.2.3").unwrap();
            assert!(matches!(v, Version::Opam(_)));
        }

        #[test]
        fn semver_orders_before_opam() {
            let semver = Version::parse("9.9.9").unwrap();
            let opam = Version::parse("opam:0.1").unwrap();
            assert!(semver < opam);
        }

        #[test]
        fn serde_round_trip() {
            let v = Version::parse("1.0.0-beta.1").unwrap();
            let json = serde_json::to_string(&v).unwrap();
            assert_eq!(json, "\"1.0.0-beta.1\"");
            assert_eq!(serde_json::from_str::<Version>(&json).unwrap(), v);
        }
    }

    proptest! {
        #[test]
        fn semver_ordering_is_antisymmetric(
            a in (0u64..10, 0u64..10, 0u64..10),
            b in (0u64..10, 0u64..10, 0u64..10),
        ) {
            let va = SemverVersion::new(a.0, a.1, a.2);
            let vb = SemverVersion::new(b.0, b.1, b.2);
            prop_assert_eq!(va.cmp(&vb), vb.cmp(&va).reverse());
        }

        #[test]
        fn opam_ordering_is_antisymmetric(a in "[0-9a-z.~+]{1,12}", b in "[0-9a-z.~+]{1,12}") {
            let va = OpamVersion::new(&a).unwrap();
            let vb = OpamVersion::new(&b).unwrap();
            prop_assert_eq!(va.cmp(&vb), vb.cmp(&va).reverse());
        }

        #[test]
        fn display_parse_round_trip(major in 0u64..100, minor in 0u64..100, patch in 0u64..100) {
            let v = Version::semver(major, minor, patch);
            prop_assert_eq!(Version::parse(&v.to_string()).unwrap(), v);
        }
    }
}
