//! The two-phase orchestrator.
//!
//! Runtime dependencies are solved first, as one atomic problem optimised
//! with the trendy strategy. Each development dependency is then solved
//! independently against the runtime closure with the minimal-addition
//! strategy, so development closures share the runtime choices, never
//! disturb them, and cannot conflict with each other. The result is a
//! [`Solution`] tree: the flat runtime closure plus one subtree per
//! development dependency holding its private packages.

use crate::backend::{SolverBackend, Strategy};
use crate::driver::{SolveConfig, Solver};
use crate::error::SolveError;
use crate::registry::Registry;
use ahash::AHashSet;
use cadenza_core::{Package, PackageId, Resolutions};
use futures::future;
use std::sync::Arc;
use tracing::info;

/// A resolved dependency tree.
///
/// The root's direct children are the runtime closure (flat, one leaf per
/// package) followed by one subtree per development dependency, whose
/// children are the packages private to that development closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// The package this node resolves.
    pub root: Package,
    /// Child solutions.
    pub children: Vec<Solution>,
}

impl Solution {
    /// A node with children.
    #[must_use]
    pub fn new(root: Package, children: Vec<Self>) -> Self {
        Self { root, children }
    }

    /// A leaf node.
    #[must_use]
    pub fn leaf(root: Package) -> Self {
        Self {
            root,
            children: Vec::new(),
        }
    }

    /// Every package in the tree, depth-first, root included.
    #[must_use]
    pub fn packages(&self) -> Vec<&Package> {
        let mut collected = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            collected.push(&node.root);
            stack.extend(node.children.iter());
        }
        collected
    }

    /// The direct child resolving `name`, if any.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children
            .iter()
            .find(|child| child.root.name.as_str() == name)
    }
}

impl<R: Registry, B: SolverBackend> Solver<R, B> {
    /// Solve a root package: runtime dependencies first, then each
    /// development dependency incrementally against the runtime closure.
    pub async fn solve(&mut self, root: &Package) -> Result<Solution, SolveError> {
        let runtime_reqs = self.add(&root.dependencies).await?;
        let dev_reqs = self.add(&root.dev_dependencies).await?;

        let runtime = self
            .solve_dependencies(&runtime_reqs, &AHashSet::new(), Strategy::Trendy)
            .await?;
        let installed: AHashSet<PackageId> = runtime.iter().map(Package::id).collect();
        info!(runtime = runtime.len(), dev = dev_reqs.len(), "runtime phase complete");

        // Each development dependency is solved independently; the runtime
        // closure is read-only across them, so they can run concurrently.
        let solver = &*self;
        let dev_children = future::try_join_all(dev_reqs.iter().map(|req| {
            let installed = &installed;
            async move {
                let solved = solver
                    .solve_dependencies(
                        std::slice::from_ref(req),
                        installed,
                        Strategy::MinimalAddition,
                    )
                    .await?;
                let dev_root = solved
                    .iter()
                    .find(|package| package.name == *req.name())
                    .cloned()
                    .ok_or_else(|| {
                        SolveError::InconsistentState(format!(
                            "solution for {req} does not contain {}",
                            req.name()
                        ))
                    })?;
                let mut private: Vec<Package> = solved
                    .into_iter()
                    .filter(|package| *package != dev_root && !installed.contains(&package.id()))
                    .collect();
                private.sort_by(|a, b| a.name.cmp(&b.name));
                Ok::<_, SolveError>(Solution::new(
                    dev_root,
                    private.into_iter().map(Solution::leaf).collect(),
                ))
            }
        }))
        .await?;

        let mut runtime_sorted: Vec<Package> = runtime.into_iter().collect();
        runtime_sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut children: Vec<Solution> =
            runtime_sorted.into_iter().map(Solution::leaf).collect();
        children.extend(dev_children);

        Ok(Solution::new(root.clone(), children))
    }
}

/// Convenience entry point: build a solver from `config` and solve `root`.
pub async fn solve<R: Registry>(
    config: SolveConfig,
    registry: Arc<R>,
    resolutions: Resolutions,
    root: &Package,
) -> Result<Solution, SolveError> {
    let mut solver = Solver::new(config, registry, resolutions)?;
    solver.solve(root).await
}
