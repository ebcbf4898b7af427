//! Reconstruction of low-level diagnostics for an unsatisfiable problem.
//!
//! The external solver answers an unsatisfiable problem with a bare failure
//! marker and no machine-readable reasons, so the driver re-walks the same
//! CUDF universe it handed the solver and derives diagnostics itself:
//! which dependency edges are in scope, which clauses no candidate can
//! satisfy, and which pairs of clauses exclude each other. The explanation
//! engine turns these into user-facing reasons.

use crate::cudf::{CudfClause, CudfDoc, CudfName, CudfPackage};
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;

/// A CUDF-level package identity.
pub type CudfId = (CudfName, u32);

/// A low-level diagnostic about the encoded problem.
///
/// Closed sum mirroring the shapes a CUDF checker reports. The explanation
/// engine consumes `Dependency`, `Missing` and `Conflict`; the remaining
/// variants are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `pkg` was reached through `clause`, which these candidates satisfy.
    Dependency {
        /// The package declaring the clause.
        pkg: CudfId,
        /// The dependency clause.
        clause: CudfClause,
        /// Candidates present in the universe satisfying the clause.
        matches: Vec<CudfId>,
    },
    /// No candidate in the universe satisfies `unmet`.
    Missing {
        /// The package declaring the clause.
        pkg: CudfId,
        /// The unsatisfiable clause.
        unmet: CudfClause,
    },
    /// Two reachable packages can never be installed together.
    Conflict {
        /// First conflicting package.
        left: CudfId,
        /// Second conflicting package.
        right: CudfId,
    },
    /// The package closure is installable.
    Success {
        /// The installable package.
        pkg: CudfId,
    },
    /// Anything the checker reports that the engine does not model.
    Other(String),
}

/// Walk the universe from the requested root and derive diagnostics.
///
/// The walk visits every package reachable through dependency clauses.
/// Each clause yields either a [`Diagnostic::Dependency`] naming the
/// candidates that satisfy it, or a [`Diagnostic::Missing`] when none do.
/// After the walk, two clauses on the same name whose candidate sets are
/// disjoint yield a [`Diagnostic::Conflict`] between their best candidates,
/// as do explicit cross-name conflicts between reached packages.
#[must_use]
pub fn diagnose(doc: &CudfDoc) -> Vec<Diagnostic> {
    let mut by_name: AHashMap<&CudfName, Vec<&CudfPackage>> = AHashMap::new();
    for package in &doc.packages {
        by_name.entry(&package.name).or_default().push(package);
    }
    for candidates in by_name.values_mut() {
        candidates.sort_by(|a, b| b.version.cmp(&a.version));
    }

    let mut diagnostics = Vec::new();
    let mut queue: VecDeque<&CudfPackage> = VecDeque::new();
    let mut visited: AHashSet<CudfId> = AHashSet::new();

    for constraint in &doc.request.install {
        for candidate in by_name.get(&constraint.name).into_iter().flatten().copied() {
            if constraint.satisfied_by(&candidate.name, candidate.version)
                && visited.insert((candidate.name.clone(), candidate.version))
            {
                queue.push_back(candidate);
            }
        }
    }

    // Every clause reached during the walk, for the disjointness pass
    let mut clause_records: Vec<(CudfId, CudfClause, Vec<CudfId>)> = Vec::new();

    while let Some(package) = queue.pop_front() {
        let pkg_id = (package.name.clone(), package.version);
        for clause in &package.depends {
            let mut matches: Vec<CudfId> = Vec::new();
            for constraint in clause {
                for candidate in by_name.get(&constraint.name).into_iter().flatten() {
                    let candidate_id = (candidate.name.clone(), candidate.version);
                    if constraint.satisfied_by(&candidate.name, candidate.version)
                        && !matches.contains(&candidate_id)
                    {
                        matches.push(candidate_id);
                    }
                }
            }
            // Best candidate first
            matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

            if matches.is_empty() {
                diagnostics.push(Diagnostic::Missing {
                    pkg: pkg_id.clone(),
                    unmet: clause.clone(),
                });
            } else {
                for matched in &matches {
                    if visited.insert(matched.clone()) {
                        if let Some(candidate) = by_name
                            .get(&matched.0)
                            .into_iter()
                            .flatten()
                            .copied()
                            .find(|p| p.version == matched.1)
                        {
                            queue.push_back(candidate);
                        }
                    }
                }
                diagnostics.push(Diagnostic::Dependency {
                    pkg: pkg_id.clone(),
                    clause: clause.clone(),
                    matches: matches.clone(),
                });
                clause_records.push((pkg_id.clone(), clause.clone(), matches));
            }
        }
    }

    // Two in-scope clauses on the same name with disjoint candidate sets can
    // never be satisfied together: any choice for one excludes every choice
    // for the other through the self-name conflict.
    let mut reported: AHashSet<(CudfId, CudfId)> = AHashSet::new();
    for (i, (_, _, left_matches)) in clause_records.iter().enumerate() {
        for (_, _, right_matches) in clause_records.iter().skip(i + 1) {
            let same_name = left_matches
                .first()
                .zip(right_matches.first())
                .is_some_and(|(l, r)| l.0 == r.0);
            if !same_name {
                continue;
            }
            let disjoint = left_matches.iter().all(|m| !right_matches.contains(m));
            if disjoint {
                let pair = (left_matches[0].clone(), right_matches[0].clone());
                if reported.insert(pair.clone()) && reported.insert((pair.1.clone(), pair.0.clone()))
                {
                    diagnostics.push(Diagnostic::Conflict {
                        left: pair.0,
                        right: pair.1,
                    });
                }
            }
        }
    }

    // Explicit cross-name conflicts between reached packages
    for package in &doc.packages {
        let pkg_id = (package.name.clone(), package.version);
        if !visited.contains(&pkg_id) {
            continue;
        }
        for constraint in &package.conflicts {
            if constraint.name == package.name {
                continue;
            }
            for candidate in by_name.get(&constraint.name).into_iter().flatten() {
                let candidate_id = (candidate.name.clone(), candidate.version);
                if visited.contains(&candidate_id)
                    && constraint.satisfied_by(&candidate.name, candidate.version)
                {
                    let pair = (pkg_id.clone(), candidate_id);
                    if reported.insert(pair.clone())
                        && reported.insert((pair.1.clone(), pair.0.clone()))
                    {
                        diagnostics.push(Diagnostic::Conflict {
                            left: pair.0,
                            right: pair.1,
                        });
                    }
                }
            }
        }
    }

    diagnostics
}
