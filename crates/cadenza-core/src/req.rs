//! Requirements and requirement overrides.

use crate::error::{Error, Result};
use crate::package::PackageName;
use crate::spec::VersionSpec;
use crate::version::Version;
use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// A requirement: a package name paired with a version spec.
///
/// The display string `name@spec` is the requirement's identity: two
/// requirements are equal iff their string forms are equal.
#[derive(Debug, Clone)]
pub struct Req {
    name: PackageName,
    spec: VersionSpec,
    raw: Arc<str>,
}

impl Req {
    /// Create a requirement from its parts.
    #[must_use]
    pub fn new(name: PackageName, spec: VersionSpec) -> Self {
        let raw = Arc::from(format!("{name}@{spec}"));
        Self { name, spec, raw }
    }

    /// The wildcard requirement on a name.
    #[must_use]
    pub fn any(name: PackageName) -> Self {
        Self::new(name, VersionSpec::any())
    }

    /// Parse `name@spec`; a bare name means the wildcard spec.
    ///
    /// Names may begin with `@` (scoped registries), so the separator is the
    /// first `@` past the leading character.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidReq(input.to_string()));
        }
        let separator = if let Some(stripped) = input.strip_prefix('@') {
            stripped.find('@').map(|i| i + 1)
        } else {
            input.find('@')
        };
        let (name, spec) = match separator {
            Some(i) => (&input[..i], &input[i + 1..]),
            None => (input, "*"),
        };
        Ok(Self::new(PackageName::parse(name)?, VersionSpec::parse(spec)?))
    }

    /// The package name this requirement constrains.
    #[must_use]
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The version spec.
    #[must_use]
    pub fn spec(&self) -> &VersionSpec {
        &self.spec
    }

    /// The display string, `name@spec`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `version` satisfies this requirement's spec.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.spec.matches(version)
    }
}

impl PartialEq for Req {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Req {}

impl Hash for Req {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for Req {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Req {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Req {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Req {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Requirement overrides, keyed by package name.
///
/// When an override exists for a name, any requirement on that name is
/// replaced wholesale before it participates in resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolutions {
    overrides: AHashMap<PackageName, Req>,
}

impl Resolutions {
    /// An empty override set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override, keyed by the override's own name.
    pub fn insert(&mut self, req: Req) {
        self.overrides.insert(req.name().clone(), req);
    }

    /// Look up the override for a name.
    #[must_use]
    pub fn get(&self, name: &PackageName) -> Option<&Req> {
        self.overrides.get(name)
    }

    /// Apply the override for `req`'s name, or return `req` unchanged.
    #[must_use]
    pub fn apply(&self, req: &Req) -> Req {
        self.get(req.name()).unwrap_or(req).clone()
    }

    /// Apply overrides to a whole dependency list.
    pub fn apply_all<'a>(&self, reqs: impl IntoIterator<Item = &'a Req>) -> Vec<Req> {
        reqs.into_iter().map(|req| self.apply(req)).collect()
    }

    /// Whether any overrides are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl FromIterator<Req> for Resolutions {
    fn from_iter<I: IntoIterator<Item = Req>>(iter: I) -> Self {
        let mut resolutions = Self::new();
        for req in iter {
            resolutions.insert(req);
        }
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(s: &str) -> Req {
        Req::parse(s).unwrap()
    }

    mod parsing {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn name_and_spec() {
            let r = req("lwt@^5.0.0");
            assert_eq!(r.name().as_str(), "lwt");
            assert_eq!(r.spec().as_str(), "^5.0.0");
            assert_eq!(r.as_str(), "lwt@^5.0.0");
        }

        #[test]
        fn bare_name_is_wildcard() {
            assert_eq!(req("lwt"), req("lwt@*"));
        }

        #[test]
        fn scoped_name() {
            let r = req("@opam/lwt@>=4.0.0");
            assert_eq!(r.name().as_str(), "@opam/lwt");
            assert_eq!(r.spec().as_str(), ">=4.0.0");
        }

        #[test]
        fn scoped_name_without_spec() {
            let r = req("@opam/lwt");
            assert_eq!(r.name().as_str(), "@opam/lwt");
            assert_eq!(r.spec().as_str(), "*");
        }

        #[test]
        fn rejects_empty() {
            assert!(Req::parse("").is_err());
            assert!(Req::parse("@^1.0.0").is_err());
        }
    }

    mod identity {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn equality_is_on_string_form() {
            assert_eq!(req("a@^1.0.0"), req("a@^1.0.0"));
            assert_ne!(req("a@^1.0.0"), req("a@>=1.0.0 <2.0.0"));
        }

        #[test]
        fn serde_round_trip() {
            let r = req("@opam/dune@^3.0.0");
            let json = serde_json::to_string(&r).unwrap();
            assert_eq!(serde_json::from_str::<Req>(&json).unwrap(), r);
        }
    }

    mod resolutions {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn apply_replaces_wholesale() {
            let resolutions: Resolutions = [req("a@^2.0.0")].into_iter().collect();
            assert_eq!(resolutions.apply(&req("a@^1.0.0")), req("a@^2.0.0"));
            assert_eq!(resolutions.apply(&req("b@^1.0.0")), req("b@^1.0.0"));
        }

        #[test]
        fn apply_all_rewrites_each() {
            let resolutions: Resolutions = [req("a@2.0.0")].into_iter().collect();
            let rewritten = resolutions.apply_all(&[req("a@^1.0.0"), req("b@*")]);
            assert_eq!(rewritten, vec![req("a@2.0.0"), req("b@*")]);
        }
    }
}
