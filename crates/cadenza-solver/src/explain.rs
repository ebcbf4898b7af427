//! Turning low-level diagnostics into user-facing reasons.
//!
//! Diagnostics talk about CUDF identities; this module lifts them back to
//! packages through the mapping, reconstructs the dependency chain that put
//! each constraint in scope, and emits a de-duplicated list of reasons in
//! diagnostic order.

use crate::diagnose::Diagnostic;
use crate::error::SolveError;
use crate::registry::Registry;
use crate::universe::CudfMapping;
use ahash::{AHashMap, AHashSet};
use cadenza_core::{Package, PackageId, Req, Resolution};
use std::fmt;
use tracing::debug;

/// A dependency chain: the requirement in scope and the path of packages
/// from the one declaring it up to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// The requirement this chain explains.
    pub req: Req,
    /// Packages from the declaring package up to the root.
    pub path: Vec<Package>,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" <- ");
        write!(f, "{rendered}")
    }
}

/// One reason a solve failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// A requirement no candidate can satisfy.
    Missing {
        /// The unmet requirement and the chain that put it in scope.
        chain: Chain,
        /// Every version the resolver knows for the name, unfiltered.
        available: Vec<Resolution>,
    },
    /// Two requirements that exclude each other.
    Conflict {
        /// Chain to the first conflicting requirement.
        left: Chain,
        /// Chain to the second conflicting requirement.
        right: Chain,
    },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { chain, available } => {
                writeln!(f, "missing package: {}", chain.req)?;
                writeln!(f, "  required by: {chain}")?;
                if available.is_empty() {
                    write!(f, "  available versions: none")
                } else {
                    let versions = available
                        .iter()
                        .map(|r| r.version.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "  available versions: {versions}")
                }
            }
            Self::Conflict { left, right } => {
                writeln!(f, "conflicting constraints:")?;
                writeln!(f, "  {} required by {}", left.req, left)?;
                write!(f, "  {} required by {}", right.req, right)
            }
        }
    }
}

/// An ordered, de-duplicated list of failure reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Explanation {
    /// The reasons, in diagnostic order.
    pub reasons: Vec<Reason>,
}

impl Explanation {
    /// Whether no reason could be reconstructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Number of reasons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reasons.len()
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, reason) in self.reasons.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{reason}")?;
        }
        Ok(())
    }
}

/// Reconstruct user-facing reasons from diagnostics.
pub(crate) async fn explain<R: Registry>(
    diagnostics: &[Diagnostic],
    mapping: &CudfMapping<'_>,
    registry: &R,
) -> Result<Explanation, SolveError> {
    // "Reached via" edges: the first diagnostic to reach a package wins.
    let mut parents: AHashMap<PackageId, Package> = AHashMap::new();
    for diagnostic in diagnostics {
        if let Diagnostic::Dependency { pkg, matches, .. } = diagnostic {
            let Some(parent) = mapping.decode(&pkg.0, pkg.1) else {
                debug!(name = %pkg.0, version = pkg.1, "dependency diagnostic names unknown package");
                continue;
            };
            for matched in matches {
                if let Some(child) = mapping.decode(&matched.0, matched.1) {
                    parents
                        .entry(child.id())
                        .or_insert_with(|| parent.clone());
                }
            }
        }
    }

    let mut reasons = Vec::new();
    let mut missing_seen: AHashSet<String> = AHashSet::new();
    let mut conflict_seen: AHashSet<(String, String)> = AHashSet::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Missing { pkg, unmet } => {
                let package = mapping.decode(&pkg.0, pkg.1).ok_or_else(|| {
                    SolveError::InconsistentState(format!(
                        "missing diagnostic names unknown package {} = {}",
                        pkg.0, pkg.1
                    ))
                })?;
                let path = if mapping.is_root(package) {
                    vec![package.clone()]
                } else {
                    let path = chain_to(&parents, package);
                    if path.len() < 2 {
                        return Err(SolveError::InconsistentState(format!(
                            "no dependency chain leads to {package}"
                        )));
                    }
                    path
                };

                let mut names = Vec::new();
                for constraint in unmet {
                    if !names.contains(&constraint.name) {
                        names.push(constraint.name.clone());
                    }
                }
                for cudf_name in names {
                    let name = cudf_name.decode().ok_or_else(|| {
                        SolveError::InconsistentState(format!(
                            "undecodable package name {cudf_name}"
                        ))
                    })?;
                    let req = package.dependency_on(&name).ok_or_else(|| {
                        SolveError::InconsistentState(format!(
                            "{package} has no declared dependency on {name}"
                        ))
                    })?;
                    if !missing_seen.insert(req.as_str().to_string()) {
                        continue;
                    }
                    let probe = Req::any(name);
                    let available =
                        registry
                            .resolve(&probe)
                            .await
                            .map_err(|source| SolveError::Resolver {
                                req: probe.to_string(),
                                source,
                            })?;
                    reasons.push(Reason::Missing {
                        chain: Chain {
                            req: req.clone(),
                            path: path.clone(),
                        },
                        available,
                    });
                }
            }
            Diagnostic::Conflict { left, right } => {
                let left = conflict_side(&parents, mapping, left)?;
                let right = conflict_side(&parents, mapping, right)?;
                let key = pair_key(&left.req, &right.req);
                if conflict_seen.insert(key) {
                    reasons.push(Reason::Conflict { left, right });
                }
            }
            Diagnostic::Dependency { .. } | Diagnostic::Success { .. } | Diagnostic::Other(_) => {}
        }
    }

    Ok(Explanation { reasons })
}

/// Walk the parent map from `package` up to whatever has no parent, which
/// is treated as the direct requestor root. A seen-set guards against the
/// map looping; on a cycle the walk terminates at the repeat.
fn chain_to(parents: &AHashMap<PackageId, Package>, package: &Package) -> Vec<Package> {
    let mut path = vec![package.clone()];
    let mut seen: AHashSet<PackageId> = AHashSet::new();
    seen.insert(package.id());
    let mut current = package.id();
    while let Some(parent) = parents.get(&current) {
        if !seen.insert(parent.id()) {
            break;
        }
        current = parent.id();
        path.push(parent.clone());
    }
    path
}

/// Chain and requirement for one side of a conflict. The requirement is
/// looked up on the requestor: the package right above the conflicting one.
fn conflict_side(
    parents: &AHashMap<PackageId, Package>,
    mapping: &CudfMapping<'_>,
    id: &crate::diagnose::CudfId,
) -> Result<Chain, SolveError> {
    let package = mapping.decode(&id.0, id.1).ok_or_else(|| {
        SolveError::InconsistentState(format!(
            "conflict diagnostic names unknown package {} = {}",
            id.0, id.1
        ))
    })?;
    let path = chain_to(parents, package);
    if path.len() < 2 {
        return Err(SolveError::InconsistentState(format!(
            "no dependency chain leads to conflicting package {package}"
        )));
    }
    let requestor = &path[1];
    let req = requestor.dependency_on(&package.name).ok_or_else(|| {
        SolveError::InconsistentState(format!(
            "{requestor} has no declared dependency on {}",
            package.name
        ))
    })?;
    Ok(Chain {
        req: req.clone(),
        path,
    })
}

/// Order-insensitive key for a conflict pair.
fn pair_key(left: &Req, right: &Req) -> (String, String) {
    let (a, b) = (left.as_str(), right.as_str());
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
