//! The solver driver: universe construction and the atomic solve.
//!
//! [`Solver::add`] expands requirements into the candidate universe using
//! streaming parallel resolution: candidates for distinct requirements are
//! resolved and materialised concurrently, insertions happen serially in
//! the drain loop, and neither a requirement nor a `(name, version)` is
//! ever processed twice. [`Solver::solve_dependencies`] encodes the
//! universe, runs the backend, and decodes the answer, reconstructing an
//! explanation when there is none.

use crate::backend::{CudfOutcome, ExternalCudfSolver, SolverBackend, Strategy};
use crate::diagnose::diagnose;
use crate::error::SolveError;
use crate::explain::explain;
use crate::registry::Registry;
use crate::universe::Universe;
use ahash::AHashSet;
use cadenza_core::{Package, PackageId, PackageName, Req, Resolutions, Version};
use dashmap::DashSet;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the synthetic root package added to every CUDF encoding.
const ROOT_NAME: &str = "__root__";

/// Solver configuration, passed by value at construction.
#[derive(Debug, Clone)]
pub struct SolveConfig {
    /// The external CUDF solver executable: a path, or a bare name searched
    /// on `PATH`.
    pub solver_bin: PathBuf,
    /// Timeout handed to the external solver via `--timeout`.
    pub timeout: Duration,
    /// Maximum concurrent registry requests during universe construction.
    pub max_concurrent: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            solver_bin: PathBuf::from("cadenza-solve-cudf"),
            timeout: Duration::from_secs(60),
            max_concurrent: 32,
        }
    }
}

/// Driver statistics for monitoring and debugging.
#[derive(Debug, Default)]
pub struct SolverStats {
    /// Requirements resolved against the registry.
    pub requirements_resolved: AtomicU64,
    /// Manifests materialised into the universe.
    pub manifests_fetched: AtomicU64,
    /// Backend invocations.
    pub solver_runs: AtomicU64,
}

/// The dependency solver driver.
///
/// Holds the append-only universe for one solve. The registry may be
/// queried concurrently; the universe itself is only written from the
/// drain loop in [`Solver::add`].
pub struct Solver<R: Registry, B: SolverBackend = ExternalCudfSolver> {
    registry: Arc<R>,
    backend: B,
    resolutions: Resolutions,
    universe: Universe,
    expanded: Arc<DashSet<PackageId>>,
    seen_reqs: AHashSet<String>,
    timeout: Duration,
    max_concurrent: usize,
    stats: Arc<SolverStats>,
}

impl<R: Registry, B: SolverBackend> std::fmt::Debug for Solver<R, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("universe_len", &self.universe.len())
            .field("timeout", &self.timeout)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl<R: Registry> Solver<R, ExternalCudfSolver> {
    /// Create a solver using the external CUDF solver from `config`.
    ///
    /// Fails with [`SolveError::Config`] when the executable is missing.
    pub fn new(
        config: SolveConfig,
        registry: Arc<R>,
        resolutions: Resolutions,
    ) -> Result<Self, SolveError> {
        let backend = ExternalCudfSolver::new(&config)?;
        Ok(Self::with_backend(config, registry, resolutions, backend))
    }
}

impl<R: Registry, B: SolverBackend> Solver<R, B> {
    /// Create a solver with a custom backend.
    pub fn with_backend(
        config: SolveConfig,
        registry: Arc<R>,
        resolutions: Resolutions,
        backend: B,
    ) -> Self {
        Self {
            registry,
            backend,
            resolutions,
            universe: Universe::new(),
            expanded: Arc::new(DashSet::new()),
            seen_reqs: AHashSet::new(),
            timeout: config.timeout,
            max_concurrent: config.max_concurrent.max(1),
            stats: Arc::new(SolverStats::default()),
        }
    }

    /// The candidate universe built so far.
    #[must_use]
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Driver statistics.
    #[must_use]
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Expand `deps` (and, transitively, the runtime dependencies of every
    /// candidate they resolve to) into the universe.
    ///
    /// Returns the requirements with [`Resolutions`] overrides applied; the
    /// caller solves against those, not the originals. Build and development
    /// dependencies of transitive packages are not expanded.
    pub async fn add(&mut self, deps: &[Req]) -> Result<Vec<Req>, SolveError> {
        let rewritten = self.resolutions.apply_all(deps);

        let mut pending: Vec<Req> = Vec::new();
        for req in &rewritten {
            if self.seen_reqs.insert(req.as_str().to_string()) {
                pending.push(req.clone());
            }
        }

        let mut in_flight = FuturesUnordered::new();
        loop {
            // Launch new resolutions up to the concurrency bound
            while in_flight.len() < self.max_concurrent {
                let Some(req) = pending.pop() else { break };
                let registry = Arc::clone(&self.registry);
                let expanded = Arc::clone(&self.expanded);
                let stats = Arc::clone(&self.stats);

                in_flight.push(async move {
                    stats.requirements_resolved.fetch_add(1, Ordering::Relaxed);
                    let candidates =
                        registry
                            .resolve(&req)
                            .await
                            .map_err(|source| SolveError::Resolver {
                                req: req.to_string(),
                                source,
                            })?;
                    let mut packages = Vec::with_capacity(candidates.len());
                    for candidate in candidates {
                        // Never materialise the same identity twice
                        if expanded.insert(candidate.id()) {
                            let package = registry.package(&candidate).await.map_err(|source| {
                                SolveError::Resolver {
                                    req: req.to_string(),
                                    source,
                                }
                            })?;
                            stats.manifests_fetched.fetch_add(1, Ordering::Relaxed);
                            packages.push(package);
                        }
                    }
                    Ok::<_, SolveError>((req, packages))
                });
            }

            if in_flight.is_empty() {
                break;
            }

            // Drain one completion; universe insertion is serialised here
            if let Some(result) = in_flight.next().await {
                let (req, packages) = result?;
                debug!(req = %req, materialised = packages.len(), "requirement resolved");
                for package in packages {
                    let deps = self.resolutions.apply_all(&package.dependencies);
                    let package = package.with_dependencies(deps);
                    for dep in &package.dependencies {
                        if self.seen_reqs.insert(dep.as_str().to_string()) {
                            pending.push(dep.clone());
                        }
                    }
                    self.universe.add(package);
                }
            }
        }

        info!(
            requirements = rewritten.len(),
            universe = self.universe.len(),
            "universe expansion complete"
        );
        Ok(rewritten)
    }

    /// Solve `deps` against the universe as one atomic problem.
    ///
    /// `installed` marks the packages of a previous phase that the chosen
    /// strategy should preserve; every member must already be in the
    /// universe. On success the returned set excludes the synthetic root.
    pub async fn solve_dependencies(
        &self,
        deps: &[Req],
        installed: &AHashSet<PackageId>,
        strategy: Strategy,
    ) -> Result<AHashSet<Package>, SolveError> {
        let root_name = PackageName::parse(ROOT_NAME)
            .map_err(|e| SolveError::InconsistentState(e.to_string()))?;
        let root = Package::new(root_name, Version::semver(0, 0, 0))
            .with_dependencies(deps.iter().cloned());

        let (doc, mapping) = self.universe.to_cudf(&root, installed)?;
        self.stats.solver_runs.fetch_add(1, Ordering::Relaxed);
        debug!(
            stanzas = doc.packages.len(),
            %strategy,
            "encoded universe"
        );

        match self.backend.solve(&doc, strategy, self.timeout).await? {
            CudfOutcome::Solution(entries) => {
                let mut selected = AHashSet::with_capacity(entries.len());
                for (name, version) in entries {
                    match mapping.decode(&name, version) {
                        Some(package) if mapping.is_root(package) => {}
                        Some(package) => {
                            selected.insert(package.clone());
                        }
                        None => {
                            warn!(name = %name, version, "solution names a package outside the universe");
                        }
                    }
                }
                info!(packages = selected.len(), %strategy, "solve complete");
                Ok(selected)
            }
            CudfOutcome::Unsat => {
                debug!("solver reported no solution, reconstructing diagnostics");
                let diagnostics = diagnose(&doc);
                let explanation =
                    explain(&diagnostics, &mapping, self.registry.as_ref()).await?;
                if explanation.is_empty() {
                    Err(SolveError::SolverProcess(
                        "solver found no solution and no diagnosis could be reconstructed".into(),
                    ))
                } else {
                    Err(SolveError::Unsatisfiable(explanation))
                }
            }
        }
    }
}
