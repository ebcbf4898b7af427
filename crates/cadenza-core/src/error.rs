//! Error types for the core model.

use thiserror::Error;

/// Errors produced while parsing model types from their string forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A version string could not be parsed.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A version spec string could not be parsed.
    #[error("invalid version spec: {0}")]
    InvalidSpec(String),

    /// A package name contains characters outside the accepted set.
    #[error("invalid package name: {0}")]
    InvalidPackageName(String),

    /// A requirement string could not be split into name and spec.
    #[error("invalid requirement: {0}")]
    InvalidReq(String),
}

/// Result type for core parsing operations.
pub type Result<T> = std::result::Result<T, Error>;
