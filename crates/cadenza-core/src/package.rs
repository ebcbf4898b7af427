//! Package identities, manifests and resolver candidates.

use crate::error::{Error, Result};
use crate::req::Req;
use crate::version::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// A validated package name.
///
/// Accepts the characters a native-ecosystem registry uses, including the
/// `@scope/name` form for packages bridged from other registries.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(Arc<str>);

impl PackageName {
    /// Parse and validate a package name.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let valid = !input.is_empty()
            && input.chars().any(|c| c.is_ascii_alphanumeric())
            && input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/' | '+'));
        if valid {
            Ok(Self(Arc::from(input)))
        } else {
            Err(Error::InvalidPackageName(input.to_string()))
        }
    }

    /// The name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PackageName").field(&self.0).finish()
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PackageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A package identity: name plus concrete version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    /// Package name.
    pub name: PackageName,
    /// Concrete version.
    pub version: Version,
}

impl PackageId {
    /// Create an identity from its parts.
    #[must_use]
    pub const fn new(name: PackageName, version: Version) -> Self {
        Self { name, version }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Where a package's sources come from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PackageSource {
    /// A downloadable archive.
    Archive {
        /// Archive URL.
        url: String,
        /// Integrity checksum, when the registry provides one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    /// A git repository pinned to a commit.
    Git {
        /// Remote URL.
        remote: String,
        /// Commit hash.
        commit: String,
    },
    /// A package on the local filesystem.
    LocalPath {
        /// Path to the package root.
        path: PathBuf,
    },
    /// No sources to fetch (synthetic packages).
    #[default]
    NoSource,
}

/// Metadata carried by packages bridged from opam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpamMetadata {
    /// The opam package name.
    pub package: String,
    /// The opam version string.
    pub version: String,
}

/// A package manifest: identity, source, and declared dependencies.
///
/// Identity is `(name, version)`; equality and hashing follow it. A package
/// is immutable once inserted into a universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Package name.
    pub name: PackageName,
    /// Concrete version.
    pub version: Version,
    /// Where the sources come from.
    #[serde(default)]
    pub source: PackageSource,
    /// Opam bridge metadata, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opam: Option<OpamMetadata>,
    /// Runtime dependencies.
    #[serde(default)]
    pub dependencies: SmallVec<[Req; 8]>,
    /// Build-time dependencies. Carried on the manifest but not expanded by
    /// the core solve.
    #[serde(default)]
    pub build_dependencies: SmallVec<[Req; 4]>,
    /// Development dependencies. Only expanded for the root package.
    #[serde(default)]
    pub dev_dependencies: SmallVec<[Req; 4]>,
}

impl Package {
    /// Create a package with no source and no dependencies.
    #[must_use]
    pub fn new(name: PackageName, version: Version) -> Self {
        Self {
            name,
            version,
            source: PackageSource::NoSource,
            opam: None,
            dependencies: SmallVec::new(),
            build_dependencies: SmallVec::new(),
            dev_dependencies: SmallVec::new(),
        }
    }

    /// Replace the runtime dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Req>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    /// Replace the build-time dependencies.
    #[must_use]
    pub fn with_build_dependencies(mut self, deps: impl IntoIterator<Item = Req>) -> Self {
        self.build_dependencies = deps.into_iter().collect();
        self
    }

    /// Replace the development dependencies.
    #[must_use]
    pub fn with_dev_dependencies(mut self, deps: impl IntoIterator<Item = Req>) -> Self {
        self.dev_dependencies = deps.into_iter().collect();
        self
    }

    /// Set the package source.
    #[must_use]
    pub fn with_source(mut self, source: PackageSource) -> Self {
        self.source = source;
        self
    }

    /// Set the opam bridge metadata.
    #[must_use]
    pub fn with_opam(mut self, opam: OpamMetadata) -> Self {
        self.opam = Some(opam);
        self
    }

    /// This package's identity.
    #[must_use]
    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.version.clone())
    }

    /// The declared runtime requirement on `name`, if any.
    #[must_use]
    pub fn dependency_on(&self, name: &PackageName) -> Option<&Req> {
        self.dependencies.iter().find(|req| req.name() == name)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// An unexpanded resolver candidate: an identity plus its source, before the
/// full manifest has been fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Package name.
    pub name: PackageName,
    /// Concrete version.
    pub version: Version,
    /// Where the sources come from.
    pub source: PackageSource,
}

impl Resolution {
    /// This candidate's identity.
    #[must_use]
    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.version.clone())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
