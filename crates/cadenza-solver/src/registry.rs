//! The registry collaborator contract.
//!
//! The solver does not talk to the network itself: it asks a [`Registry`]
//! for candidate versions and manifests. Implementations are expected to do
//! real I/O, so both operations are async and callers must not assume they
//! are cheap. The driver never re-expands the same `(name, version)`, which
//! gives implementations implicit manifest caching.

use async_trait::async_trait;
use cadenza_core::{Package, Req, Resolution};
use thiserror::Error;

/// Errors a registry can produce.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Network failure while contacting the registry.
    #[error("network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// A manifest was fetched but could not be parsed.
    #[error("invalid manifest for {name}: {message}")]
    ManifestParse {
        /// The package whose manifest is broken.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// The registry has never heard of this package.
    #[error("no such package: {name}")]
    NoSuchPackage {
        /// The unknown package name.
        name: String,
    },
}

/// Resolves requirements to candidates and candidates to manifests.
#[async_trait]
pub trait Registry: Send + Sync {
    /// All candidates satisfying `req`, newest first.
    ///
    /// A known name with no satisfying versions resolves to an empty list;
    /// the solver reports that as a missing package rather than an error.
    async fn resolve(&self, req: &Req) -> Result<Vec<Resolution>, RegistryError>;

    /// Expand a candidate into its full manifest.
    async fn package(&self, resolution: &Resolution) -> Result<Package, RegistryError>;
}
