//! End-to-end solves against an in-memory registry and an in-process
//! backend, covering the solver's observable contract: version selection,
//! transitive closure, failure explanations, requirement overrides, and
//! development-dependency isolation.

use ahash::AHashSet;
use cadenza_core::{Package, PackageId, Resolutions};
use cadenza_solver::{Reason, SolveConfig, SolveError, Solver, Strategy};
use cadenza_test_utils::{FailingRegistry, SearchBackend, StaticRegistry, pkg, req, reqs};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn solver(registry: StaticRegistry) -> Solver<StaticRegistry, SearchBackend> {
    solver_with(registry, Resolutions::new())
}

fn solver_with(
    registry: StaticRegistry,
    resolutions: Resolutions,
) -> Solver<StaticRegistry, SearchBackend> {
    Solver::with_backend(
        SolveConfig::default(),
        Arc::new(registry),
        resolutions,
        SearchBackend,
    )
}

fn names(set: &AHashSet<Package>) -> Vec<String> {
    let mut names: Vec<String> = set.iter().map(ToString::to_string).collect();
    names.sort();
    names
}

#[tokio::test]
async fn single_package_picks_the_newest_version() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0"))
        .with(pkg("a", "1.1.0"));
    let mut solver = solver(registry);

    let root = pkg("root", "0.0.0").with_dependencies(reqs(&["a@^1.0.0"]));
    let solution = solver.solve(&root).await.unwrap();

    assert_eq!(solution.root, root);
    assert_eq!(solution.children.len(), 1);
    assert_eq!(solution.children[0].root, pkg("a", "1.1.0"));
    assert!(solution.children[0].children.is_empty());
}

#[tokio::test]
async fn transitive_dependencies_join_the_runtime_closure() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["b@^2.0.0"])))
        .with(pkg("b", "2.0.0"));
    let mut solver = solver(registry);

    let deps = solver.add(&reqs(&["a@^1.0.0"])).await.unwrap();
    let solved = solver
        .solve_dependencies(&deps, &AHashSet::new(), Strategy::Trendy)
        .await
        .unwrap();

    assert_eq!(names(&solved), ["a@1.0.0", "b@2.0.0"]);
}

#[tokio::test]
async fn conflicting_constraints_are_explained_pairwise() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["c@^1.0.0"])))
        .with(pkg("b", "1.0.0").with_dependencies(reqs(&["c@^2.0.0"])))
        .with(pkg("c", "1.0.0"))
        .with(pkg("c", "2.0.0"));
    let mut solver = solver(registry);

    let root = pkg("root", "0.0.0").with_dependencies(reqs(&["a@^1.0.0", "b@^1.0.0"]));
    let error = solver.solve(&root).await.unwrap_err();

    let SolveError::Unsatisfiable(explanation) = error else {
        panic!("expected an unsatisfiable explanation, got: {error}");
    };
    assert_eq!(explanation.len(), 1);
    let Reason::Conflict { left, right } = &explanation.reasons[0] else {
        panic!("expected a conflict reason");
    };

    assert_eq!(left.req, req("c@^1.0.0"));
    let left_names: Vec<&str> = left.path.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(left_names, ["c", "a", "__root__"]);
    assert_eq!(left.path[0], pkg("c", "1.0.0"));

    assert_eq!(right.req, req("c@^2.0.0"));
    let right_names: Vec<&str> = right.path.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(right_names, ["c", "b", "__root__"]);
    assert_eq!(right.path[0], pkg("c", "2.0.0"));
}

#[tokio::test]
async fn missing_package_reports_the_chain_and_available_versions() {
    let mut solver = solver(StaticRegistry::new());

    let root = pkg("root", "0.0.0").with_dependencies(reqs(&["a@^1.0.0"]));
    let error = solver.solve(&root).await.unwrap_err();

    let SolveError::Unsatisfiable(explanation) = error else {
        panic!("expected an unsatisfiable explanation, got: {error}");
    };
    assert_eq!(explanation.len(), 1);
    let Reason::Missing { chain, available } = &explanation.reasons[0] else {
        panic!("expected a missing reason");
    };
    assert_eq!(chain.req, req("a@^1.0.0"));
    let chain_names: Vec<&str> = chain.path.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(chain_names, ["__root__"]);
    assert!(available.is_empty());
}

#[tokio::test]
async fn missing_package_reports_unfiltered_available_versions() {
    // "a" exists, just not in the requested range
    let registry = StaticRegistry::new().with(pkg("a", "0.3.0"));
    let mut solver = solver(registry);

    let root = pkg("root", "0.0.0").with_dependencies(reqs(&["a@^1.0.0"]));
    let error = solver.solve(&root).await.unwrap_err();

    let SolveError::Unsatisfiable(explanation) = error else {
        panic!("expected an unsatisfiable explanation, got: {error}");
    };
    let Reason::Missing { available, .. } = &explanation.reasons[0] else {
        panic!("expected a missing reason");
    };
    let versions: Vec<String> = available.iter().map(|r| r.version.to_string()).collect();
    assert_eq!(versions, ["0.3.0"]);
}

#[tokio::test]
async fn resolutions_override_requirements_wholesale() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0"))
        .with(pkg("a", "2.0.0"))
        .with(pkg("b", "1.0.0").with_dependencies(reqs(&["a@^1.0.0"])));
    let resolutions: Resolutions = [req("a@^2.0.0")].into_iter().collect();
    let mut solver = solver_with(registry, resolutions);

    let root = pkg("root", "0.0.0").with_dependencies(reqs(&["b@^1.0.0", "a@^1.0.0"]));
    let solution = solver.solve(&root).await.unwrap();

    let packages: Vec<String> = solution
        .children
        .iter()
        .map(|child| child.root.to_string())
        .collect();
    assert_eq!(packages, ["a@2.0.0", "b@1.0.0"]);

    // The universe's copy of b has its dependency rewritten through the
    // override as well
    let b = solver
        .universe()
        .get(&pkg("b", "1.0.0").id())
        .unwrap();
    assert_eq!(b.dependencies.to_vec(), vec![req("a@^2.0.0")]);
}

#[tokio::test]
async fn dev_dependencies_share_the_runtime_closure() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["b@^1.0.0"])))
        .with(pkg("b", "1.0.0"))
        .with(pkg("t", "1.0.0").with_dependencies(reqs(&["b@^1.0.0"])));
    let mut solver = solver(registry);

    let root = pkg("root", "0.0.0")
        .with_dependencies(reqs(&["a@^1.0.0"]))
        .with_dev_dependencies(reqs(&["t@^1.0.0"]));
    let solution = solver.solve(&root).await.unwrap();

    let runtime: Vec<String> = solution
        .children
        .iter()
        .filter(|child| child.children.is_empty() && child.root.name.as_str() != "t")
        .map(|child| child.root.to_string())
        .collect();
    assert_eq!(runtime, ["a@1.0.0", "b@1.0.0"]);

    // b is already in the runtime closure, so t brings nothing private
    let dev = solution.child("t").unwrap();
    assert_eq!(dev.root, pkg("t", "1.0.0"));
    assert!(dev.children.is_empty());
}

#[tokio::test]
async fn dev_dependencies_keep_private_packages_private() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0"))
        .with(pkg("t", "1.0.0").with_dependencies(reqs(&["d@^1.0.0"])))
        .with(pkg("d", "1.0.0"));
    let mut solver = solver(registry);

    let root = pkg("root", "0.0.0")
        .with_dependencies(reqs(&["a@^1.0.0"]))
        .with_dev_dependencies(reqs(&["t@^1.0.0"]));
    let solution = solver.solve(&root).await.unwrap();

    let dev = solution.child("t").unwrap();
    assert_eq!(dev.children.len(), 1);
    assert_eq!(dev.children[0].root, pkg("d", "1.0.0"));

    // The private package does not appear in the runtime closure
    assert!(
        solution
            .children
            .iter()
            .all(|child| child.root.name.as_str() != "d")
    );
}

#[tokio::test]
async fn dev_solves_keep_the_runtime_installation() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["b@^1.0.0"])))
        .with(pkg("b", "1.0.0"))
        .with(pkg("t", "1.0.0"));
    let mut solver = solver(registry);

    let runtime_reqs = solver.add(&reqs(&["a@^1.0.0"])).await.unwrap();
    let dev_reqs = solver.add(&reqs(&["t@^1.0.0"])).await.unwrap();
    let runtime = solver
        .solve_dependencies(&runtime_reqs, &AHashSet::new(), Strategy::Trendy)
        .await
        .unwrap();
    let installed: AHashSet<PackageId> = runtime.iter().map(Package::id).collect();

    let dev = solver
        .solve_dependencies(&dev_reqs, &installed, Strategy::MinimalAddition)
        .await
        .unwrap();

    // The dev solution is a superset of the runtime closure
    for package in &runtime {
        assert!(dev.contains(package), "{package} dropped by the dev solve");
    }
    assert!(dev.contains(&pkg("t", "1.0.0")));
}

#[tokio::test]
async fn solving_is_deterministic() {
    let build = || {
        StaticRegistry::new()
            .with(pkg("a", "1.0.0").with_dependencies(reqs(&["c@^1.0.0"])))
            .with(pkg("a", "1.2.0").with_dependencies(reqs(&["c@^1.0.0"])))
            .with(pkg("b", "0.9.0"))
            .with(pkg("c", "1.0.0"))
            .with(pkg("c", "1.4.0"))
            .with(pkg("t", "1.0.0").with_dependencies(reqs(&["b@^0.9.0"])))
    };
    let root = pkg("root", "0.0.0")
        .with_dependencies(reqs(&["a@^1.0.0"]))
        .with_dev_dependencies(reqs(&["t@^1.0.0"]));

    let first = solver(build()).solve(&root).await.unwrap();
    let second = solver(build()).solve(&root).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn runtime_closure_is_closed_and_unique_per_name() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["b@^1.0.0", "c@*"])))
        .with(pkg("b", "1.0.0").with_dependencies(reqs(&["c@^2.0.0"])))
        .with(pkg("c", "2.1.0"))
        .with(pkg("c", "2.0.0"));
    let mut solver = solver(registry);

    let deps = solver.add(&reqs(&["a@^1.0.0"])).await.unwrap();
    let solved = solver
        .solve_dependencies(&deps, &AHashSet::new(), Strategy::Trendy)
        .await
        .unwrap();

    // Closure: every dependency of every chosen package is satisfied inside
    // the solution
    for package in &solved {
        for dep in &package.dependencies {
            assert!(
                solved
                    .iter()
                    .any(|candidate| candidate.name == *dep.name() && dep.matches(&candidate.version)),
                "{package} requires {dep}, which the solution does not satisfy"
            );
        }
    }
    // Uniqueness: one version per name
    let mut seen_names: Vec<&str> = solved.iter().map(|p| p.name.as_str()).collect();
    seen_names.sort_unstable();
    let mut deduped = seen_names.clone();
    deduped.dedup();
    assert_eq!(seen_names, deduped);
}

#[tokio::test]
async fn adding_twice_leaves_the_universe_unchanged() {
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["b@^1.0.0"])))
        .with(pkg("b", "1.0.0"));
    let mut solver = solver(registry);

    let deps = reqs(&["a@^1.0.0"]);
    solver.add(&deps).await.unwrap();
    let snapshot = solver.universe().clone();
    solver.add(&deps).await.unwrap();
    assert_eq!(*solver.universe(), snapshot);
}

#[tokio::test]
async fn registry_failures_carry_the_requirement_context() {
    let mut solver: Solver<FailingRegistry, SearchBackend> = Solver::with_backend(
        SolveConfig::default(),
        Arc::new(FailingRegistry),
        Resolutions::new(),
        SearchBackend,
    );

    let error = solver.add(&reqs(&["a@^1.0.0"])).await.unwrap_err();
    assert!(matches!(error, SolveError::Resolver { .. }));
    assert_eq!(error.to_string(), "resolving request: a@^1.0.0");
}

#[tokio::test]
async fn build_and_dev_dependencies_of_transitive_packages_are_not_expanded() {
    let registry = StaticRegistry::new()
        .with(
            pkg("a", "1.0.0")
                .with_build_dependencies(reqs(&["build-tool@^1.0.0"]))
                .with_dev_dependencies(reqs(&["a-test@^1.0.0"])),
        )
        .with(pkg("build-tool", "1.0.0"))
        .with(pkg("a-test", "1.0.0"));
    let mut solver = solver(registry);

    solver.add(&reqs(&["a@^1.0.0"])).await.unwrap();

    assert!(solver.universe().mem(&pkg("a", "1.0.0").id()));
    assert!(!solver.universe().mem(&pkg("build-tool", "1.0.0").id()));
    assert!(!solver.universe().mem(&pkg("a-test", "1.0.0").id()));
}

#[tokio::test]
async fn duplicate_missing_requirements_are_reported_once() {
    // Both a and b miss the same requirement on ghost
    let registry = StaticRegistry::new()
        .with(pkg("a", "1.0.0").with_dependencies(reqs(&["ghost@^1.0.0"])))
        .with(pkg("b", "1.0.0").with_dependencies(reqs(&["ghost@^1.0.0"])));
    let mut solver = solver(registry);

    let root = pkg("root", "0.0.0").with_dependencies(reqs(&["a@^1.0.0", "b@^1.0.0"]));
    let error = solver.solve(&root).await.unwrap_err();

    let SolveError::Unsatisfiable(explanation) = error else {
        panic!("expected an unsatisfiable explanation, got: {error}");
    };
    let missing: Vec<_> = explanation
        .reasons
        .iter()
        .filter(|reason| matches!(reason, Reason::Missing { .. }))
        .collect();
    assert_eq!(missing.len(), 1);
}
