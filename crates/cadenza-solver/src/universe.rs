//! The candidate universe and its CUDF encoding.
//!
//! The universe is the append-only set of packages the solver may choose
//! from, indexed by name and ordered newest-first within a name. It is built
//! once per solve by the driver and shared read-only by every
//! `solve_dependencies` call.
//!
//! [`Universe::to_cudf`] is the only place where the CUDF encoding leaks:
//! versions are renumbered to dense positive integers per name, preserving
//! the native order, and the returned [`CudfMapping`] is the sole way back
//! from CUDF identities to packages.

use crate::cudf::{
    CudfClause, CudfConstraint, CudfDoc, CudfName, CudfPackage, CudfRelOp, CudfRequest,
};
use crate::error::SolveError;
use ahash::{AHashMap, AHashSet};
use cadenza_core::{Package, PackageId, PackageName, Req};
use tracing::trace;

/// The set of candidate packages for one solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    entries: AHashMap<PackageName, Vec<Package>>,
}

impl Universe {
    /// An empty universe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a package with this identity is present.
    #[must_use]
    pub fn mem(&self, id: &PackageId) -> bool {
        self.entries
            .get(&id.name)
            .is_some_and(|versions| versions.iter().any(|p| p.version == id.version))
    }

    /// Look up a package by identity.
    #[must_use]
    pub fn get(&self, id: &PackageId) -> Option<&Package> {
        self.entries
            .get(&id.name)?
            .iter()
            .find(|p| p.version == id.version)
    }

    /// All candidates for a name, newest first.
    #[must_use]
    pub fn versions_of(&self, name: &PackageName) -> &[Package] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }

    /// Insert a package. Idempotent: inserting an identity already present
    /// leaves the universe unchanged.
    pub fn add(&mut self, package: Package) {
        let versions = self.entries.entry(package.name.clone()).or_default();
        // Descending by version; ignore duplicates
        match versions.binary_search_by(|p| package.version.cmp(&p.version)) {
            Ok(_) => trace!(package = %package, "already in universe"),
            Err(position) => versions.insert(position, package),
        }
    }

    /// Number of packages across all names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether the universe holds no packages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over every package, in unspecified order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.entries.values().flatten()
    }

    /// Encode this universe plus a synthetic root package as a CUDF problem.
    ///
    /// Every identity in `installed` must already be in the universe; those
    /// stanzas are marked `installed` and `keep` so the solver's criteria
    /// can honour the current installation. The root must not collide with
    /// a universe name.
    pub fn to_cudf<'u>(
        &'u self,
        root: &Package,
        installed: &AHashSet<PackageId>,
    ) -> Result<(CudfDoc, CudfMapping<'u>), SolveError> {
        for id in installed {
            if !self.mem(id) {
                return Err(SolveError::InconsistentState(format!(
                    "installed package {id} is not in the universe"
                )));
            }
        }
        if !self.versions_of(&root.name).is_empty() {
            return Err(SolveError::InconsistentState(format!(
                "root package name {} collides with a universe package",
                root.name
            )));
        }

        let mut names: Vec<&PackageName> = self.entries.keys().collect();
        names.sort();

        let mut mapping = CudfMapping {
            universe: self,
            root: root.clone(),
            root_cudf: (CudfName::encode(&root.name), 1),
            versions: AHashMap::with_capacity(self.len()),
            ids: AHashMap::with_capacity(self.len() + 1),
            names: AHashMap::with_capacity(self.entries.len() + 1),
        };
        mapping
            .names
            .insert(root.name.clone(), mapping.root_cudf.0.clone());
        mapping
            .ids
            .insert(mapping.root_cudf.clone(), root.id());

        // Dense renumbering: within a name the newest candidate gets the
        // highest integer, the oldest gets 1, so the solver's numeric
        // preference matches the native version order.
        for &name in &names {
            let cudf_name = CudfName::encode(name);
            mapping.names.insert(name.clone(), cudf_name.clone());
            let candidates = self.versions_of(name);
            let count = u32::try_from(candidates.len()).map_err(|_| {
                SolveError::InconsistentState(format!("too many versions of {name}"))
            })?;
            for (package, cudf_version) in candidates.iter().zip((1..=count).rev()) {
                mapping.versions.insert(package.id(), cudf_version);
                mapping
                    .ids
                    .insert((cudf_name.clone(), cudf_version), package.id());
            }
        }

        let mut packages = Vec::with_capacity(self.len() + 1);
        for &name in &names {
            let candidates = self.versions_of(name);
            // Stanzas in ascending CUDF version order
            for package in candidates.iter().rev() {
                let id = package.id();
                let is_installed = installed.contains(&id);
                packages.push(CudfPackage {
                    name: mapping.names[name].clone(),
                    version: mapping.versions[&id],
                    depends: self.encode_dependencies(&mapping, &package.dependencies),
                    conflicts: vec![CudfConstraint::on(mapping.names[name].clone())],
                    installed: is_installed,
                    keep: is_installed,
                });
            }
        }
        packages.push(CudfPackage {
            name: mapping.root_cudf.0.clone(),
            version: mapping.root_cudf.1,
            depends: self.encode_dependencies(&mapping, &root.dependencies),
            conflicts: vec![CudfConstraint::on(mapping.root_cudf.0.clone())],
            installed: false,
            keep: false,
        });

        let request = CudfRequest {
            install: vec![CudfConstraint::exact(
                mapping.root_cudf.0.clone(),
                mapping.root_cudf.1,
            )],
        };

        Ok((CudfDoc { packages, request }, mapping))
    }

    /// Encode a dependency list as CUDF clauses: one clause per requirement,
    /// listing every candidate version satisfying the spec. A requirement no
    /// candidate satisfies encodes as `name < 1`, which no stanza can meet,
    /// so the solver reports it missing instead of it being silently
    /// dropped.
    fn encode_dependencies(&self, mapping: &CudfMapping<'_>, deps: &[Req]) -> Vec<CudfClause> {
        deps.iter()
            .map(|req| {
                let cudf_name = mapping
                    .names
                    .get(req.name())
                    .cloned()
                    .unwrap_or_else(|| CudfName::encode(req.name()));
                let matching: Vec<CudfConstraint> = self
                    .versions_of(req.name())
                    .iter()
                    .rev()
                    .filter(|candidate| req.matches(&candidate.version))
                    .map(|candidate| {
                        CudfConstraint::exact(cudf_name.clone(), mapping.versions[&candidate.id()])
                    })
                    .collect();
                if matching.is_empty() {
                    vec![CudfConstraint {
                        name: cudf_name,
                        version: Some((CudfRelOp::Lt, 1)),
                    }]
                } else {
                    matching
                }
            })
            .collect()
    }
}

impl FromIterator<Package> for Universe {
    fn from_iter<I: IntoIterator<Item = Package>>(iter: I) -> Self {
        let mut universe = Self::new();
        for package in iter {
            universe.add(package);
        }
        universe
    }
}

/// Bidirectional mapping between native packages and their CUDF encoding.
///
/// Borrows the universe it encoded, so it cannot outlive it; the synthetic
/// root is held by value because it is not part of the universe.
#[derive(Debug)]
pub struct CudfMapping<'u> {
    universe: &'u Universe,
    root: Package,
    root_cudf: (CudfName, u32),
    versions: AHashMap<PackageId, u32>,
    ids: AHashMap<(CudfName, u32), PackageId>,
    names: AHashMap<PackageName, CudfName>,
}

impl CudfMapping<'_> {
    /// The synthetic root package of this encoding.
    #[must_use]
    pub fn root(&self) -> &Package {
        &self.root
    }

    /// Whether `package` is the synthetic root.
    #[must_use]
    pub fn is_root(&self, package: &Package) -> bool {
        package.name == self.root.name && package.version == self.root.version
    }

    /// The CUDF identity of a native package.
    #[must_use]
    pub fn encode(&self, id: &PackageId) -> Option<(CudfName, u32)> {
        if id.name == self.root.name && id.version == self.root.version {
            return Some(self.root_cudf.clone());
        }
        let name = self.names.get(&id.name)?;
        let version = self.versions.get(id)?;
        Some((name.clone(), *version))
    }

    /// The native package behind a CUDF identity.
    #[must_use]
    pub fn decode(&self, name: &CudfName, version: u32) -> Option<&Package> {
        if (name, version) == (&self.root_cudf.0, self.root_cudf.1) {
            return Some(&self.root);
        }
        let id = self.ids.get(&(name.clone(), version))?;
        self.universe.get(id)
    }
}
