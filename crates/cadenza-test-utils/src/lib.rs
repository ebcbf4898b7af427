//! Testing utilities for the Cadenza solving core.
//!
//! Provides an in-memory [`StaticRegistry`], an in-process exhaustive
//! [`SearchBackend`] so tests never need the external solver executable,
//! and small fixture constructors. Test-only code: constructors panic on
//! malformed fixture input.

use ahash::AHashMap;
use async_trait::async_trait;
use cadenza_core::{Package, PackageName, Req, Resolution, Version};
use cadenza_solver::cudf::{CudfClause, CudfDoc, CudfName, CudfPackage};
use cadenza_solver::diagnose::CudfId;
use cadenza_solver::{CudfOutcome, Registry, RegistryError, SolveError, SolverBackend, Strategy};
use std::collections::BTreeMap;
use std::time::Duration;

/// Initialise tracing output for a test run. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a package fixture.
///
/// # Panics
///
/// Panics on malformed name or version strings.
#[must_use]
pub fn pkg(name: &str, version: &str) -> Package {
    Package::new(
        PackageName::parse(name).unwrap(),
        Version::parse(version).unwrap(),
    )
}

/// Parse a requirement fixture.
///
/// # Panics
///
/// Panics on malformed requirement strings.
#[must_use]
pub fn req(spec: &str) -> Req {
    Req::parse(spec).unwrap()
}

/// Parse a list of requirement fixtures.
///
/// # Panics
///
/// Panics on malformed requirement strings.
#[must_use]
pub fn reqs(specs: &[&str]) -> Vec<Req> {
    specs.iter().map(|spec| req(spec)).collect()
}

/// An in-memory registry serving a fixed set of packages.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    packages: AHashMap<PackageName, Vec<Package>>,
}

impl StaticRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, keeping versions newest-first.
    pub fn add(&mut self, package: Package) {
        let versions = self.packages.entry(package.name.clone()).or_default();
        versions.push(package);
        versions.sort_by(|a, b| b.version.cmp(&a.version));
    }

    /// Builder-style [`StaticRegistry::add`].
    #[must_use]
    pub fn with(mut self, package: Package) -> Self {
        self.add(package);
        self
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn resolve(&self, req: &Req) -> Result<Vec<Resolution>, RegistryError> {
        Ok(self
            .packages
            .get(req.name())
            .into_iter()
            .flatten()
            .filter(|package| req.matches(&package.version))
            .map(|package| Resolution {
                name: package.name.clone(),
                version: package.version.clone(),
                source: package.source.clone(),
            })
            .collect())
    }

    async fn package(&self, resolution: &Resolution) -> Result<Package, RegistryError> {
        self.packages
            .get(&resolution.name)
            .into_iter()
            .flatten()
            .find(|package| package.version == resolution.version)
            .cloned()
            .ok_or_else(|| RegistryError::NoSuchPackage {
                name: resolution.name.to_string(),
            })
    }
}

/// A registry whose every operation fails, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingRegistry;

#[async_trait]
impl Registry for FailingRegistry {
    async fn resolve(&self, _req: &Req) -> Result<Vec<Resolution>, RegistryError> {
        Err(RegistryError::Network {
            message: "connection refused".into(),
        })
    }

    async fn package(&self, _resolution: &Resolution) -> Result<Package, RegistryError> {
        Err(RegistryError::Network {
            message: "connection refused".into(),
        })
    }
}

/// An in-process CUDF backend doing an exhaustive search.
///
/// Intended for the small universes tests build: it keeps the current
/// installation, prefers higher CUDF versions (which the encoding aligns
/// with native version order), and backtracks on conflicts. No external
/// executable, no I/O.
#[derive(Debug, Default)]
pub struct SearchBackend;

#[async_trait]
impl SolverBackend for SearchBackend {
    async fn solve(
        &self,
        doc: &CudfDoc,
        _strategy: Strategy,
        _timeout: Duration,
    ) -> Result<CudfOutcome, SolveError> {
        Ok(search(doc).map_or(CudfOutcome::Unsat, CudfOutcome::Solution))
    }
}

type Assignment = BTreeMap<CudfName, u32>;

fn search(doc: &CudfDoc) -> Option<Vec<CudfId>> {
    let mut by_name: BTreeMap<&CudfName, Vec<&CudfPackage>> = BTreeMap::new();
    for package in &doc.packages {
        by_name.entry(&package.name).or_default().push(package);
    }
    for candidates in by_name.values_mut() {
        candidates.sort_by(|a, b| b.version.cmp(&a.version));
    }

    // The current installation is kept; its dependency clauses join the
    // goals so a broken installation cannot be silently returned.
    let mut chosen: Assignment = Assignment::new();
    let mut goals: Vec<CudfClause> = doc
        .request
        .install
        .iter()
        .map(|constraint| vec![constraint.clone()])
        .collect();
    for package in &doc.packages {
        if package.installed {
            if chosen.insert(package.name.clone(), package.version).is_some() {
                return None;
            }
            goals.extend(package.depends.iter().cloned());
        }
    }

    solve_goals(&by_name, chosen, goals).map(|assignment| assignment.into_iter().collect())
}

fn clause_satisfied(clause: &CudfClause, chosen: &Assignment) -> bool {
    clause.iter().any(|constraint| {
        chosen
            .get(&constraint.name)
            .is_some_and(|&version| constraint.satisfied_by(&constraint.name, version))
    })
}

fn lookup<'a>(
    by_name: &BTreeMap<&CudfName, Vec<&'a CudfPackage>>,
    name: &CudfName,
    version: u32,
) -> Option<&'a CudfPackage> {
    by_name
        .get(name)?
        .iter()
        .find(|package| package.version == version)
        .copied()
}

fn conflicts(
    candidate: &CudfPackage,
    chosen: &Assignment,
    by_name: &BTreeMap<&CudfName, Vec<&CudfPackage>>,
) -> bool {
    // A package never conflicts with itself; other versions of its own name
    // cannot be chosen because assignments are keyed by name.
    for constraint in &candidate.conflicts {
        if constraint.name == candidate.name {
            continue;
        }
        if let Some(&version) = chosen.get(&constraint.name) {
            if constraint.satisfied_by(&constraint.name, version) {
                return true;
            }
        }
    }
    for (name, &version) in chosen {
        let Some(stanza) = lookup(by_name, name, version) else {
            continue;
        };
        for constraint in &stanza.conflicts {
            if constraint.name == stanza.name {
                continue;
            }
            if constraint.satisfied_by(&candidate.name, candidate.version) {
                return true;
            }
        }
    }
    false
}

fn solve_goals(
    by_name: &BTreeMap<&CudfName, Vec<&CudfPackage>>,
    chosen: Assignment,
    mut goals: Vec<CudfClause>,
) -> Option<Assignment> {
    let Some(position) = goals
        .iter()
        .position(|clause| !clause_satisfied(clause, &chosen))
    else {
        return Some(chosen);
    };
    let clause = goals.swap_remove(position);

    let mut candidates: Vec<&CudfPackage> = Vec::new();
    for constraint in &clause {
        for package in by_name.get(&constraint.name).into_iter().flatten().copied() {
            if constraint.satisfied_by(&package.name, package.version)
                && !candidates
                    .iter()
                    .any(|c| c.name == package.name && c.version == package.version)
            {
                candidates.push(package);
            }
        }
    }
    // Highest version first within a name
    candidates.sort_by(|a, b| a.name.cmp(&b.name).then(b.version.cmp(&a.version)));

    for candidate in candidates {
        // The clause is unsatisfied, so a choice for this name is either
        // absent or a different version; the latter cannot be displaced.
        if chosen.contains_key(&candidate.name) {
            continue;
        }
        if conflicts(candidate, &chosen, by_name) {
            continue;
        }
        let mut next_chosen = chosen.clone();
        next_chosen.insert(candidate.name.clone(), candidate.version);
        let mut next_goals = goals.clone();
        next_goals.extend(candidate.depends.iter().cloned());
        if let Some(solution) = solve_goals(by_name, next_chosen, next_goals) {
            return Some(solution);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_solver::cudf::{CudfConstraint, CudfRequest};
    use pretty_assertions::assert_eq;

    fn name(s: &str) -> CudfName {
        CudfName::from_encoded(s)
    }

    fn stanza(n: &str, version: u32, depends: Vec<CudfClause>) -> CudfPackage {
        CudfPackage {
            name: name(n),
            version,
            depends,
            conflicts: vec![CudfConstraint::on(name(n))],
            installed: false,
            keep: false,
        }
    }

    fn request(root: &str) -> CudfRequest {
        CudfRequest {
            install: vec![CudfConstraint::exact(name(root), 1)],
        }
    }

    #[test]
    fn picks_the_highest_satisfying_version() {
        let doc = CudfDoc {
            packages: vec![
                stanza(
                    "root",
                    1,
                    vec![vec![
                        CudfConstraint::exact(name("a"), 1),
                        CudfConstraint::exact(name("a"), 2),
                    ]],
                ),
                stanza("a", 1, vec![]),
                stanza("a", 2, vec![]),
            ],
            request: request("root"),
        };
        let solution = search(&doc).unwrap();
        assert!(solution.contains(&(name("a"), 2)));
        assert!(!solution.contains(&(name("a"), 1)));
    }

    #[test]
    fn backtracks_through_transitive_conflicts() {
        // root needs a (any) and c = 1; a = 2 needs c = 2, a = 1 needs c = 1.
        // The search must back off a = 2 and settle on a = 1.
        let doc = CudfDoc {
            packages: vec![
                stanza(
                    "root",
                    1,
                    vec![
                        vec![
                            CudfConstraint::exact(name("a"), 1),
                            CudfConstraint::exact(name("a"), 2),
                        ],
                        vec![CudfConstraint::exact(name("c"), 1)],
                    ],
                ),
                stanza("a", 1, vec![vec![CudfConstraint::exact(name("c"), 1)]]),
                stanza("a", 2, vec![vec![CudfConstraint::exact(name("c"), 2)]]),
                stanza("c", 1, vec![]),
                stanza("c", 2, vec![]),
            ],
            request: request("root"),
        };
        let solution = search(&doc).unwrap();
        assert!(solution.contains(&(name("a"), 1)));
        assert!(solution.contains(&(name("c"), 1)));
    }

    #[test]
    fn reports_unsat_when_no_assignment_exists() {
        let doc = CudfDoc {
            packages: vec![
                stanza(
                    "root",
                    1,
                    vec![
                        vec![CudfConstraint::exact(name("c"), 1)],
                        vec![CudfConstraint::exact(name("c"), 2)],
                    ],
                ),
                stanza("c", 1, vec![]),
                stanza("c", 2, vec![]),
            ],
            request: request("root"),
        };
        assert_eq!(search(&doc), None);
    }

    #[test]
    fn keeps_the_installed_set() {
        let mut installed = stanza("b", 1, vec![]);
        installed.installed = true;
        installed.keep = true;
        let doc = CudfDoc {
            packages: vec![stanza("root", 1, vec![]), installed],
            request: request("root"),
        };
        let solution = search(&doc).unwrap();
        assert!(solution.contains(&(name("b"), 1)));
        assert!(solution.contains(&(name("root"), 1)));
    }
}
