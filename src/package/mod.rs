// src/package/mod.rs

//! Package header snapshots
//!
//! A `PackageHeader` is the typed, immutable view of everything the engine
//! reads from a package: identity, the four dependency arrays and the file
//! list. Elements share headers through `Arc` so that the available index,
//! the element and the database cache never copy file lists around.

pub mod deps;
pub mod files;

pub use deps::{DepTag, Dependency, DependencySet, Sense};
pub use files::{FileEntry, FileFlags, FileKind, FileSet, FileState, Relocation};

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::version::RpmVersion;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Typed header data for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHeader {
    pub name: String,
    pub epoch: Option<u64>,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub os: String,
    pub provides: DependencySet,
    pub requires: DependencySet,
    pub conflicts: DependencySet,
    pub obsoletes: DependencySet,
    pub files: FileSet,
    /// Relocatable prefixes
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Multilib color: OR of the file colors
    #[serde(default)]
    pub color: u32,
    /// Database offset when the header was loaded from the database
    #[serde(skip)]
    pub instance: Option<u32>,
}

impl PackageHeader {
    /// Start building a header from a name and an `[E:]V-R` string
    pub fn builder(name: &str, evr: &str) -> HeaderBuilder {
        HeaderBuilder::new(name, evr)
    }

    /// `[E:]V-R`
    pub fn evr(&self) -> String {
        match self.epoch {
            Some(e) => format!("{}:{}-{}", e, self.version, self.release),
            None => format!("{}-{}", self.version, self.release),
        }
    }

    /// `name-[E:]V-R`
    pub fn nevr(&self) -> String {
        format!("{}-{}", self.name, self.evr())
    }

    /// `name-[E:]V-R.arch`
    pub fn nevra(&self) -> String {
        format!("{}.{}", self.nevr(), self.arch)
    }

    pub fn rpm_version(&self) -> RpmVersion {
        RpmVersion::from_parts(self.epoch, &self.version, Some(&self.release))
    }

    /// Compare versions of two headers (names are not considered)
    pub fn compare_version(&self, other: &PackageHeader) -> Ordering {
        self.rpm_version().compare(&other.rpm_version())
    }

    /// The `name = [E:]V-R` self-provide
    pub fn self_provide(&self) -> Dependency {
        Dependency::versioned(self.name.clone(), Sense::EQUAL, self.evr())
    }

    /// Does this header provide something matching `dep`?
    pub fn provides_match(&self, dep: &Dependency) -> bool {
        self.provides.any_matches(dep)
    }

    /// Identical name, EVR and arch
    pub fn same_nevra(&self, other: &PackageHeader) -> bool {
        self.name == other.name
            && self.arch == other.arch
            && self.compare_version(other) == Ordering::Equal
    }
}

/// Builder for `PackageHeader`, used by callers that construct headers from
/// repository metadata and by tests
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    name: String,
    evr: String,
    arch: String,
    os: String,
    deps: Vec<(DepTag, String, Sense)>,
    files: FileSet,
    prefixes: Vec<String>,
}

impl HeaderBuilder {
    fn new(name: &str, evr: &str) -> Self {
        Self {
            name: name.to_string(),
            evr: evr.to_string(),
            arch: "x86_64".to_string(),
            os: "linux".to_string(),
            deps: Vec::new(),
            files: FileSet::new(),
            prefixes: Vec::new(),
        }
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.arch = arch.to_string();
        self
    }

    pub fn os(mut self, os: &str) -> Self {
        self.os = os.to_string();
        self
    }

    pub fn provides(mut self, dep: &str) -> Self {
        self.deps.push((DepTag::Provides, dep.to_string(), Sense::ANY));
        self
    }

    pub fn requires(mut self, dep: &str) -> Self {
        self.deps.push((DepTag::Requires, dep.to_string(), Sense::ANY));
        self
    }

    /// Requires with context bits, e.g. `Sense::SCRIPT_PRE` or `Sense::PREREQ`
    pub fn requires_with(mut self, dep: &str, context: Sense) -> Self {
        self.deps.push((DepTag::Requires, dep.to_string(), context));
        self
    }

    pub fn conflicts(mut self, dep: &str) -> Self {
        self.deps.push((DepTag::Conflicts, dep.to_string(), Sense::ANY));
        self
    }

    pub fn obsoletes(mut self, dep: &str) -> Self {
        self.deps.push((DepTag::Obsoletes, dep.to_string(), Sense::ANY));
        self
    }

    pub fn file(mut self, path: &str, entry: FileEntry) -> Self {
        self.files.add(path, entry);
        self
    }

    pub fn digest_algo(mut self, algo: HashAlgorithm) -> Self {
        self.files.digest_algo = algo;
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefixes.push(prefix.to_string());
        self
    }

    /// Parse the collected dependency strings and finish the header
    ///
    /// The self-provide `name = [E:]V-R` is appended when the provides do
    /// not already contain an entry for the package name.
    pub fn build(self) -> Result<PackageHeader> {
        if self.name.is_empty() {
            return Err(Error::ParseError("Package name is empty".to_string()));
        }
        let evr = RpmVersion::parse(&self.evr)?;
        let release = evr.release.clone().ok_or_else(|| {
            Error::ParseError(format!(
                "Package {} has no release in '{}'",
                self.name, self.evr
            ))
        })?;

        let mut header = PackageHeader {
            name: self.name,
            epoch: evr.epoch,
            version: evr.version,
            release,
            arch: self.arch,
            os: self.os,
            provides: DependencySet::new(DepTag::Provides),
            requires: DependencySet::new(DepTag::Requires),
            conflicts: DependencySet::new(DepTag::Conflicts),
            obsoletes: DependencySet::new(DepTag::Obsoletes),
            color: self.files.color(),
            files: self.files,
            prefixes: self.prefixes,
            instance: None,
        };

        for (tag, text, context) in self.deps {
            let dep = Dependency::parse(&text)?.with_context(context);
            match tag {
                DepTag::Provides => header.provides.push(dep),
                DepTag::Requires => header.requires.push(dep),
                DepTag::Conflicts => header.conflicts.push(dep),
                DepTag::Obsoletes => header.obsoletes.push(dep),
            }
        }

        if !header.provides.contains_name(&header.name) {
            let own = header.self_provide();
            header.provides.push(own);
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_adds_self_provide() {
        let h = PackageHeader::builder("bash", "5.2.15-3")
            .requires("glibc >= 2.34")
            .build()
            .unwrap();

        assert_eq!(h.nevr(), "bash-5.2.15-3");
        assert_eq!(h.nevra(), "bash-5.2.15-3.x86_64");
        assert!(h.provides_match(&Dependency::parse("bash >= 5").unwrap()));
        assert!(!h.provides_match(&Dependency::parse("bash >= 6").unwrap()));
        assert_eq!(h.requires.len(), 1);
    }

    #[test]
    fn test_epoch_in_nevr() {
        let h = PackageHeader::builder("perl", "4:5.36.0-1").build().unwrap();
        assert_eq!(h.evr(), "4:5.36.0-1");
        assert_eq!(h.self_provide().to_string(), "perl = 4:5.36.0-1");
    }

    #[test]
    fn test_builder_rejects_missing_release() {
        assert!(PackageHeader::builder("x", "1.0").build().is_err());
        assert!(PackageHeader::builder("", "1.0-1").build().is_err());
        assert!(
            PackageHeader::builder("x", "1.0-1")
                .requires("y >")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_color_from_files() {
        let h = PackageHeader::builder("libfoo", "1.0-1")
            .file("/usr/lib64/libfoo.so.1", FileEntry::regular(10, "aa").with_color(2))
            .file("/usr/share/foo/data", FileEntry::regular(10, "bb"))
            .build()
            .unwrap();
        assert_eq!(h.color, 2);
    }

    #[test]
    fn test_compare_version() {
        let old = PackageHeader::builder("a", "1.0-1").build().unwrap();
        let new = PackageHeader::builder("a", "1.0-2").build().unwrap();
        assert_eq!(old.compare_version(&new), Ordering::Less);
        assert!(!old.same_nevra(&new));
        assert!(old.same_nevra(&old.clone()));
    }
}
