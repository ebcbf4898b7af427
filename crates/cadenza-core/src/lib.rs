//! Core types for the Cadenza dependency solving core.
//!
//! This crate provides the foundational model shared by the solver:
//! - Package names, identities and manifests
//! - Versions with both semver-style and opam-style ordering
//! - Version specs (predicates over versions)
//! - Requirements and requirement overrides

pub mod error;
pub mod package;
pub mod req;
pub mod spec;
pub mod version;

pub use error::{Error, Result};
pub use package::{OpamMetadata, Package, PackageId, PackageName, PackageSource, Resolution};
pub use req::{Req, Resolutions};
pub use spec::VersionSpec;
pub use version::{OpamVersion, SemverVersion, Version};

// Re-export commonly used collection types
pub use ahash::{AHashMap, AHashSet};
