//! Error types for the solving core.

use crate::explain::Explanation;
use crate::registry::RegistryError;
use thiserror::Error;

/// Errors produced while building the universe or solving it.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The constraints admit no solution; the explanation carries the
    /// reconstructed reasons.
    #[error("constraints are unsatisfiable:\n{0}")]
    Unsatisfiable(Explanation),

    /// The registry failed while resolving a requirement.
    #[error("resolving request: {req}")]
    Resolver {
        /// The requirement being resolved.
        req: String,
        /// The underlying registry failure.
        #[source]
        source: RegistryError,
    },

    /// The external solver process misbehaved: crash, timeout, or output
    /// that carried no usable diagnostic.
    #[error("solver process failed: {0}")]
    SolverProcess(String),

    /// An internal invariant was broken while reconstructing diagnostics.
    /// Indicates a bug, not a user-facing condition.
    #[error("inconsistent solver state: {0}")]
    InconsistentState(String),

    /// The solver was misconfigured, e.g. the external solver executable
    /// could not be found.
    #[error("solver configuration: {0}")]
    Config(String),

    /// An I/O failure around the solver subprocess or its temp files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolveError>;
