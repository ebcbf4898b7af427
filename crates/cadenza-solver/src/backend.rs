//! The external CUDF solver and the seam it sits behind.
//!
//! One `solve_dependencies` call maps to one CUDF document, one subprocess,
//! one temp file. The temp file lives for the duration of the call and is
//! removed on every exit path, including cancellation: dropping the future
//! drops the [`tempfile::NamedTempFile`] and kills the child process.

use crate::cudf::{CudfDoc, parse_solution};
use crate::diagnose::CudfId;
use crate::driver::SolveConfig;
use crate::error::SolveError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit status the external solver uses for "no solution exists".
const UNSAT_EXIT: i32 = 1;

/// Optimisation criterion handed to the external solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Runtime phase: keep installed packages, prefer up-to-date versions,
    /// minimise newly introduced names.
    Trendy,
    /// Development phase: leave the installed set as untouched as possible.
    MinimalAddition,
}

impl Strategy {
    /// The criterion string passed via `--strategy`.
    #[must_use]
    pub const fn criterion(self) -> &'static str {
        match self {
            Self::Trendy => "-removed,-notuptodate,-new",
            Self::MinimalAddition => "-removed,-changed,-notuptodate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trendy => "trendy",
            Self::MinimalAddition => "minimal-addition",
        };
        write!(f, "{name}")
    }
}

/// What the solver said about a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CudfOutcome {
    /// The packages installed in the proposed final state.
    Solution(Vec<CudfId>),
    /// No solution exists.
    Unsat,
}

/// Answers CUDF problems.
///
/// Production uses [`ExternalCudfSolver`]; tests substitute an in-process
/// implementation so no executable is needed.
#[async_trait]
pub trait SolverBackend: Send + Sync {
    /// Solve one CUDF problem.
    async fn solve(
        &self,
        doc: &CudfDoc,
        strategy: Strategy,
        timeout: Duration,
    ) -> Result<CudfOutcome, SolveError>;
}

/// The external PBO/SAT solver, spoken to over temp files and stdout.
#[derive(Debug)]
pub struct ExternalCudfSolver {
    bin: PathBuf,
}

impl ExternalCudfSolver {
    /// Locate the configured executable. Fails with [`SolveError::Config`]
    /// when it cannot be found, so a missing solver surfaces at
    /// construction rather than mid-solve.
    pub fn new(config: &SolveConfig) -> Result<Self, SolveError> {
        let bin = locate(&config.solver_bin).ok_or_else(|| {
            SolveError::Config(format!(
                "external solver executable not found: {}",
                config.solver_bin.display()
            ))
        })?;
        Ok(Self { bin })
    }
}

/// Resolve a solver command to an executable path: paths with separators
/// are checked directly, bare names are searched on `PATH`.
fn locate(command: &Path) -> Option<PathBuf> {
    if command.components().count() > 1 {
        return command.is_file().then(|| command.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl SolverBackend for ExternalCudfSolver {
    async fn solve(
        &self,
        doc: &CudfDoc,
        strategy: Strategy,
        timeout: Duration,
    ) -> Result<CudfOutcome, SolveError> {
        let file = tempfile::Builder::new()
            .prefix("cadenza-solve-")
            .suffix(".cudf")
            .tempfile()?;
        tokio::fs::write(file.path(), doc.to_string()).await?;

        debug!(
            solver = %self.bin.display(),
            file = %file.path().display(),
            %strategy,
            "invoking external solver"
        );
        let output = Command::new(&self.bin)
            .arg(format!("--strategy={}", strategy.criterion()))
            .arg(format!("--timeout={}", timeout.as_secs()))
            .arg(file.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                match parse_solution(&stdout) {
                    Some(entries) => {
                        let installed: Vec<CudfId> = entries
                            .into_iter()
                            .filter(|entry| entry.installed)
                            .map(|entry| (entry.name, entry.version))
                            .collect();
                        if installed.is_empty() {
                            Ok(CudfOutcome::Unsat)
                        } else {
                            Ok(CudfOutcome::Solution(installed))
                        }
                    }
                    None => {
                        debug!("solver stdout did not parse as a solution");
                        Ok(CudfOutcome::Unsat)
                    }
                }
            }
            Some(UNSAT_EXIT) => Ok(CudfOutcome::Unsat),
            status => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(?status, stderr = %stderr.trim(), "external solver failed");
                Err(SolveError::SolverProcess(format!(
                    "solver exited with status {status:?}: {}",
                    stderr.trim()
                )))
            }
        }
    }
}
