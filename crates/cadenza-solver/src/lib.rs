//! Dependency solving core for the Cadenza package manager.
//!
//! Given a root package with runtime and development dependencies, this
//! crate produces a fully resolved [`Solution`]: one concrete version per
//! package name, or a structured [`Explanation`] of why none exists.
//!
//! The pipeline:
//!
//! 1. **Universe construction**: [`Solver::add`] recursively expands
//!    requirements through the [`Registry`] collaborator into an
//!    append-only candidate [`Universe`].
//! 2. **Encoding and solving**: [`Solver::solve_dependencies`] encodes
//!    the universe as a CUDF problem, delegates satisfiability to an
//!    external PBO/SAT solver subprocess, and decodes the answer.
//! 3. **Explanation synthesis**: when no solution exists, the same CUDF
//!    universe is re-walked to reconstruct human-readable dependency
//!    chains and pairwise conflicts.
//!
//! Runtime and development dependencies are solved in two phases with
//! different optimisation strategies; each development dependency is solved
//! incrementally against the runtime closure so its private packages never
//! disturb runtime choices.

pub mod backend;
pub mod cudf;
pub mod diagnose;
pub mod driver;
pub mod error;
pub mod explain;
pub mod registry;
pub mod solve;
pub mod universe;

pub use backend::{CudfOutcome, ExternalCudfSolver, SolverBackend, Strategy};
pub use driver::{SolveConfig, Solver, SolverStats};
pub use error::SolveError;
pub use explain::{Chain, Explanation, Reason};
pub use registry::{Registry, RegistryError};
pub use solve::{Solution, solve};
pub use universe::{CudfMapping, Universe};
