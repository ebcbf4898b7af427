//! CUDF document model, text printer and solution parser.
//!
//! The external solver speaks CUDF (Common Upgradeability Description
//! Format): a stanza-based text format describing a package universe and an
//! install request, answered with a stanza-based solution document. This
//! module owns both directions of that text interface. How native packages
//! and versions map onto CUDF names and integers is the mapping's business
//! (see [`crate::universe`]); nothing here knows about native versions.

use cadenza_core::PackageName;
use std::fmt;
use std::sync::Arc;

/// Characters allowed verbatim in an encoded CUDF package name.
fn is_cudf_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'@' | b'+' | b'.' | b'_' | b'-')
}

/// A package name in CUDF encoding.
///
/// Native names may contain characters CUDF does not accept (notably `/` in
/// scoped names), so bytes outside the accepted set are percent-escaped.
/// The escaping is reversible; [`CudfName::decode`] restores the native name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CudfName(Arc<str>);

impl CudfName {
    /// Encode a native package name.
    #[must_use]
    pub fn encode(name: &PackageName) -> Self {
        let raw = name.as_str().as_bytes();
        let mut encoded = String::with_capacity(raw.len());
        for &byte in raw {
            if is_cudf_name_char(byte) {
                encoded.push(byte as char);
            } else {
                encoded.push_str(&format!("%{byte:02x}"));
            }
        }
        Self(Arc::from(encoded))
    }

    /// Decode back to the native package name.
    #[must_use]
    pub fn decode(&self) -> Option<PackageName> {
        let mut decoded = Vec::with_capacity(self.0.len());
        let mut bytes = self.0.bytes();
        while let Some(byte) = bytes.next() {
            if byte == b'%' {
                let hi = bytes.next()?;
                let lo = bytes.next()?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).ok()?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
            } else {
                decoded.push(byte);
            }
        }
        PackageName::parse(std::str::from_utf8(&decoded).ok()?).ok()
    }

    /// Wrap an already encoded name, as read from solver output.
    #[must_use]
    pub fn from_encoded(encoded: &str) -> Self {
        Self(Arc::from(encoded))
    }

    /// The encoded form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CudfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relational operator in a CUDF version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CudfRelOp {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `>=`
    Geq,
    /// `>`
    Gt,
    /// `<=`
    Leq,
    /// `<`
    Lt,
}

impl CudfRelOp {
    /// Whether `version` satisfies `version <op> bound`.
    #[must_use]
    pub fn eval(self, version: u32, bound: u32) -> bool {
        match self {
            Self::Eq => version == bound,
            Self::Neq => version != bound,
            Self::Geq => version >= bound,
            Self::Gt => version > bound,
            Self::Leq => version <= bound,
            Self::Lt => version < bound,
        }
    }
}

impl fmt::Display for CudfRelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Geq => ">=",
            Self::Gt => ">",
            Self::Leq => "<=",
            Self::Lt => "<",
        };
        write!(f, "{s}")
    }
}

/// A single CUDF constraint: a name, optionally bounded to versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CudfConstraint {
    /// Constrained package name.
    pub name: CudfName,
    /// Version bound; `None` means any version.
    pub version: Option<(CudfRelOp, u32)>,
}

impl CudfConstraint {
    /// A constraint on any version of `name`.
    #[must_use]
    pub const fn on(name: CudfName) -> Self {
        Self {
            name,
            version: None,
        }
    }

    /// A constraint on exactly `version` of `name`.
    #[must_use]
    pub const fn exact(name: CudfName, version: u32) -> Self {
        Self {
            name,
            version: Some((CudfRelOp::Eq, version)),
        }
    }

    /// Whether the package `(name, version)` satisfies this constraint.
    #[must_use]
    pub fn satisfied_by(&self, name: &CudfName, version: u32) -> bool {
        &self.name == name
            && self
                .version
                .is_none_or(|(op, bound)| op.eval(version, bound))
    }
}

impl fmt::Display for CudfConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            None => write!(f, "{}", self.name),
            Some((op, bound)) => write!(f, "{} {op} {bound}", self.name),
        }
    }
}

/// A dependency clause: a disjunction of constraints.
pub type CudfClause = Vec<CudfConstraint>;

/// One package stanza in a CUDF universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudfPackage {
    /// Encoded package name.
    pub name: CudfName,
    /// Renumbered version, `>= 1`.
    pub version: u32,
    /// Dependencies in conjunctive normal form.
    pub depends: Vec<CudfClause>,
    /// Conflicts; every stanza at least carries the self-name conflict so at
    /// most one version per name is installable.
    pub conflicts: Vec<CudfConstraint>,
    /// Whether this package is part of the current installation.
    pub installed: bool,
    /// Whether the solver must keep this package installed.
    pub keep: bool,
}

/// The request stanza: which constraints to install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CudfRequest {
    /// Constraints to install.
    pub install: Vec<CudfConstraint>,
}

/// A complete CUDF problem document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudfDoc {
    /// Package stanzas.
    pub packages: Vec<CudfPackage>,
    /// The request stanza.
    pub request: CudfRequest,
}

impl fmt::Display for CudfDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "preamble:")?;
        writeln!(f)?;
        for package in &self.packages {
            writeln!(f, "package: {}", package.name)?;
            writeln!(f, "version: {}", package.version)?;
            if !package.depends.is_empty() {
                let depends = package
                    .depends
                    .iter()
                    .map(|clause| {
                        clause
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(" | ")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "depends: {depends}")?;
            }
            if !package.conflicts.is_empty() {
                let conflicts = package
                    .conflicts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "conflicts: {conflicts}")?;
            }
            writeln!(f, "installed: {}", package.installed)?;
            if package.keep {
                writeln!(f, "keep: package")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "request:")?;
        let install = self
            .request
            .install
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "install: {install}")?;
        Ok(())
    }
}

/// One package entry from a CUDF solution document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudfSolutionEntry {
    /// Encoded package name.
    pub name: CudfName,
    /// Renumbered version.
    pub version: u32,
    /// Whether the package is installed in the proposed state.
    pub installed: bool,
}

/// Parse a CUDF solution document.
///
/// Returns `None` when the output is not a solution: a `FAIL` marker, an
/// empty document, or anything that does not parse as stanzas. Stanzas other
/// than package stanzas (e.g. a preamble) are skipped.
#[must_use]
pub fn parse_solution(input: &str) -> Option<Vec<CudfSolutionEntry>> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.starts_with("FAIL") {
        return None;
    }

    struct Partial {
        name: CudfName,
        version: Option<u32>,
        installed: bool,
    }

    let mut entries = Vec::new();
    let mut current: Option<Partial> = None;
    let mut flush = |current: &mut Option<Partial>| -> Option<()> {
        if let Some(partial) = current.take() {
            entries.push(CudfSolutionEntry {
                name: partial.name,
                version: partial.version?,
                installed: partial.installed,
            });
        }
        Some(())
    };

    for line in input.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            flush(&mut current)?;
            continue;
        }
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        match key.trim() {
            "package" => {
                flush(&mut current)?;
                current = Some(Partial {
                    name: CudfName::from_encoded(value),
                    version: None,
                    installed: false,
                });
            }
            "version" => {
                if let Some(partial) = current.as_mut() {
                    partial.version = Some(value.parse().ok()?);
                }
            }
            "installed" => {
                if let Some(partial) = current.as_mut() {
                    partial.installed = value == "true";
                }
            }
            // Preamble fields and unknown per-package properties
            _ => {}
        }
    }
    flush(&mut current)?;
    Some(entries)
}
