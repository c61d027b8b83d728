// src/resolver/check.rs

//! Dependency checker
//!
//! Every requirement is looked up in a fixed order: built-in capabilities,
//! then packages added to the transaction, then the dependency cache, then
//! the installed database. Installed packages being removed are pruned
//! from every database lookup.
//!
//! Added elements have their Requires and Conflicts checked, plus the
//! Conflicts of installed packages against what they provide. Removed
//! elements instead check that installed packages still find everything
//! the removal takes away.

use super::ResolverContext;
use super::builtin::check_builtin;
use crate::config::ResolverConfig;
use crate::db::{DbTag, PackageDatabase};
use crate::error::Result;
use crate::package::{DepTag, Dependency};
use crate::transaction::available::{AddedKey, AvailableIndex};
use crate::transaction::element::TransactionElement;
use crate::transaction::problems::{Problem, ProblemKind, ProblemSet};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Outcome of a single dependency lookup
///
/// Lookup failures are the `Err` side of the `Result` this is wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepStatus {
    Satisfied,
    Unsatisfied,
}

impl DepStatus {
    fn from_bool(satisfied: bool) -> Self {
        if satisfied {
            Self::Satisfied
        } else {
            Self::Unsatisfied
        }
    }

    pub fn is_satisfied(self) -> bool {
        self == Self::Satisfied
    }
}

/// Checks Requires and Conflicts of a transaction
pub struct DependencyChecker<'a> {
    config: &'a ResolverConfig,
    db: Option<&'a dyn PackageDatabase>,
    available: &'a AvailableIndex,
    universe: Option<&'a AvailableIndex>,
    removed: &'a BTreeSet<u32>,
    ctx: &'a mut ResolverContext,
}

impl<'a> DependencyChecker<'a> {
    pub fn new(
        config: &'a ResolverConfig,
        db: Option<&'a dyn PackageDatabase>,
        available: &'a AvailableIndex,
        removed: &'a BTreeSet<u32>,
        ctx: &'a mut ResolverContext,
    ) -> Self {
        Self {
            config,
            db,
            available,
            universe: None,
            removed,
            ctx,
        }
    }

    /// Index consulted for suggested providers
    pub fn with_universe(mut self, universe: Option<&'a AvailableIndex>) -> Self {
        self.universe = universe;
        self
    }

    /// Dependencies of the wrong multilib color are not checked
    fn color_filtered(&self, dep: &Dependency) -> bool {
        let tscolor = self.config.transaction_color;
        tscolor != 0 && dep.color != 0 && tscolor & dep.color == 0
    }

    /// The cache is only trusted while the database is seen unpruned
    fn cache_usable(&self) -> bool {
        self.ctx.cache_enabled() && self.removed.is_empty()
    }

    /// Resolve one dependency
    ///
    /// `exclude` hides one added package from the lookup, so that a package
    /// never conflicts with itself.
    pub fn resolve(
        &mut self,
        tag: DepTag,
        dep: &Dependency,
        exclude: Option<AddedKey>,
    ) -> Result<DepStatus> {
        if let Some(satisfied) = check_builtin(dep) {
            debug!("{} answered by built-in table: {}", dep, satisfied);
            return Ok(DepStatus::from_bool(satisfied));
        }

        if self
            .available
            .all_satisfies(dep)
            .into_iter()
            .any(|key| Some(key) != exclude)
        {
            debug!("{} satisfied by an added package", dep);
            return Ok(DepStatus::Satisfied);
        }

        let Some(db) = self.db else {
            return Ok(DepStatus::Unsatisfied);
        };

        let key = dep.dnevr(tag);
        let cache = if self.cache_usable() {
            db.dependency_cache()
        } else {
            None
        };

        if let Some(cache) = cache {
            match cache.get(&key) {
                Ok(Some(satisfied)) => {
                    debug!("{} answered by dependency cache: {}", key, satisfied);
                    self.ctx.record_cache_hit();
                    return Ok(DepStatus::from_bool(satisfied));
                }
                Ok(None) => {}
                Err(e) => self.ctx.disable_cache(&e),
            }
        }

        let satisfied = self.db_satisfies(db, dep)?;

        if let Some(cache) = cache
            && self.ctx.cache_enabled()
            && let Err(e) = cache.put(&key, satisfied)
        {
            self.ctx.disable_cache(&e);
        }

        Ok(DepStatus::from_bool(satisfied))
    }

    fn db_satisfies(&self, db: &dyn PackageDatabase, dep: &Dependency) -> Result<bool> {
        if dep.is_file()
            && db
                .iter(DbTag::BaseNames, &dep.name)?
                .prune(self.removed)
                .next()
                .is_some()
        {
            debug!("{} owned by an installed package", dep);
            return Ok(true);
        }

        for header in db.iter(DbTag::ProvideName, &dep.name)?.prune(self.removed) {
            if header.provides_match(dep) {
                debug!("{} provided by installed {}", dep, header.nevr());
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn suggestions(&self, dep: &Dependency) -> Vec<String> {
        if self.config.no_suggest {
            return Vec::new();
        }
        let Some(universe) = self.universe else {
            return Vec::new();
        };
        let mut names: Vec<String> = universe
            .all_satisfies(dep)
            .into_iter()
            .filter_map(|key| universe.header(key).map(|h| h.nevr()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Check every element; problems are collected, lookup failures abort
    pub fn check(&mut self, elements: &[TransactionElement]) -> Result<ProblemSet> {
        info!("Checking dependencies of {} elements", elements.len());
        let mut problems = ProblemSet::new();

        for element in elements {
            match element.added_key() {
                Some(key) => self.check_added(element, key, &mut problems)?,
                None => self.check_removed(element, &mut problems)?,
            }
        }

        info!(
            "Dependency check found {} problems ({} cache hits)",
            problems.len(),
            self.ctx.cache_hits()
        );
        Ok(problems)
    }

    fn check_added(
        &mut self,
        element: &TransactionElement,
        key: AddedKey,
        problems: &mut ProblemSet,
    ) -> Result<()> {
        let nevr = element.nevr();

        for dep in element.requires() {
            if self.color_filtered(dep) {
                continue;
            }
            if self.resolve(DepTag::Requires, dep, None)? == DepStatus::Unsatisfied {
                debug!("{} requires {}: unsatisfied", nevr, dep);
                problems.push(
                    Problem::new(ProblemKind::UnsatisfiedRequires, &nevr)
                        .with_subject(dep.to_string())
                        .with_suggestions(self.suggestions(dep)),
                );
            }
        }

        for dep in element.conflicts() {
            if self.color_filtered(dep) {
                continue;
            }
            if self.resolve(DepTag::Conflicts, dep, Some(key))?.is_satisfied() {
                debug!("{} conflicts with {}", nevr, dep);
                problems.push(
                    Problem::new(ProblemKind::Conflict, &nevr).with_subject(dep.to_string()),
                );
            }
        }

        self.check_dependent_conflicts(element, problems)
    }

    /// Installed packages whose Conflicts match what `element` provides
    fn check_dependent_conflicts(
        &mut self,
        element: &TransactionElement,
        problems: &mut ProblemSet,
    ) -> Result<()> {
        let Some(db) = self.db else {
            return Ok(());
        };

        let names: BTreeSet<&str> = element.provides().iter().map(|d| d.name.as_str()).collect();
        for name in names {
            for installed in db.iter(DbTag::ConflictName, name)?.prune(self.removed) {
                for dep in installed.conflicts.iter().filter(|d| d.name == name) {
                    if self.color_filtered(dep) || !element.header().provides_match(dep) {
                        continue;
                    }
                    debug!("installed {} conflicts with {}", installed.nevr(), dep);
                    problems.push(
                        Problem::new(ProblemKind::Conflict, installed.nevr())
                            .installed()
                            .with_alt(element.nevr())
                            .with_subject(dep.to_string()),
                    );
                }
            }
        }
        Ok(())
    }

    /// Installed packages that require something a removal takes away
    fn check_removed(
        &mut self,
        element: &TransactionElement,
        problems: &mut ProblemSet,
    ) -> Result<()> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for dep in element.provides() {
            if seen.insert(dep.name.clone()) {
                names.push(dep.name.clone());
            }
        }
        for (index, _) in element.files().iter() {
            let path = element.files().path(index);
            if seen.insert(path.clone()) {
                names.push(path);
            }
        }

        for name in &names {
            self.check_dependent_packages(element, name, problems)?;
        }
        Ok(())
    }

    fn check_dependent_packages(
        &mut self,
        element: &TransactionElement,
        name: &str,
        problems: &mut ProblemSet,
    ) -> Result<()> {
        let Some(db) = self.db else {
            return Ok(());
        };

        let dependents: Vec<_> = db.iter(DbTag::RequireName, name)?.prune(self.removed).collect();
        for installed in dependents {
            let requires: Vec<Dependency> = installed
                .requires
                .iter()
                .filter(|d| d.name == name)
                .cloned()
                .collect();
            for dep in &requires {
                if self.color_filtered(dep) {
                    continue;
                }
                if self.resolve(DepTag::Requires, dep, None)? == DepStatus::Unsatisfied {
                    debug!(
                        "removing {} breaks {} of installed {}",
                        element.nevr(),
                        dep,
                        installed.nevr()
                    );
                    problems.push(
                        Problem::new(ProblemKind::UnsatisfiedRequires, installed.nevr())
                            .installed()
                            .with_alt(element.nevr())
                            .with_subject(dep.to_string())
                            .with_suggestions(self.suggestions(dep)),
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use crate::package::{FileEntry, PackageHeader};
    use std::sync::Arc;

    fn dep(s: &str) -> Dependency {
        Dependency::parse(s).unwrap()
    }

    fn index(headers: Vec<PackageHeader>) -> AvailableIndex {
        AvailableIndex::from_headers(headers)
    }

    #[test]
    fn test_lookup_order() {
        let config = ResolverConfig::default();
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.insert_package(
            &PackageHeader::builder("glibc", "2.38-1")
                .provides("libc.so.6")
                .file("/usr/lib64/libc.so.6", FileEntry::regular(10, "aa"))
                .build()
                .unwrap(),
        )
        .unwrap();
        let available = index(vec![
            PackageHeader::builder("foo", "1.0-1").build().unwrap(),
        ]);
        let removed = BTreeSet::new();
        let mut ctx = ResolverContext::new(&config).unwrap();
        let mut checker = DependencyChecker::new(&config, Some(&db), &available, &removed, &mut ctx);

        fn r(c: &mut DependencyChecker<'_>, s: &str) -> DepStatus {
            c.resolve(DepTag::Requires, &dep(s), None).unwrap()
        }
        assert_eq!(r(&mut checker, "rpmlib(CompressedFileNames)"), DepStatus::Satisfied);
        assert_eq!(r(&mut checker, "foo >= 1.0"), DepStatus::Satisfied);
        assert_eq!(r(&mut checker, "libc.so.6"), DepStatus::Satisfied);
        assert_eq!(r(&mut checker, "/usr/lib64/libc.so.6"), DepStatus::Satisfied);
        assert_eq!(r(&mut checker, "glibc >= 3"), DepStatus::Unsatisfied);
        assert_eq!(r(&mut checker, "/usr/lib/libc.so.6"), DepStatus::Unsatisfied);
    }

    #[test]
    fn test_cache_answers_repeat_lookups() {
        let config = ResolverConfig::default();
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.insert_package(&PackageHeader::builder("zlib", "1.3-1").build().unwrap())
            .unwrap();
        let available = AvailableIndex::new();
        let removed = BTreeSet::new();
        let mut ctx = ResolverContext::new(&config).unwrap();

        {
            let mut checker =
                DependencyChecker::new(&config, Some(&db), &available, &removed, &mut ctx);
            let d = dep("zlib >= 1");
            assert!(checker.resolve(DepTag::Requires, &d, None).unwrap().is_satisfied());
            assert!(checker.resolve(DepTag::Requires, &d, None).unwrap().is_satisfied());
        }
        assert_eq!(ctx.cache_hits(), 1);

        use crate::db::DependencyCache;
        assert_eq!(db.get("R zlib >= 1").unwrap(), Some(true));
    }

    #[test]
    fn test_broken_cache_is_disabled_for_the_run() {
        let config = ResolverConfig::default();
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.insert_package(&PackageHeader::builder("zlib", "1.3-1").build().unwrap())
            .unwrap();
        db.connection().execute("DROP TABLE depcache", []).unwrap();
        let available = AvailableIndex::new();
        let removed = BTreeSet::new();
        let mut ctx = ResolverContext::new(&config).unwrap();

        {
            let mut checker =
                DependencyChecker::new(&config, Some(&db), &available, &removed, &mut ctx);
            let status = checker.resolve(DepTag::Requires, &dep("zlib >= 1"), None).unwrap();
            assert_eq!(status, DepStatus::Satisfied);
            let status = checker.resolve(DepTag::Requires, &dep("zlib >= 2"), None).unwrap();
            assert_eq!(status, DepStatus::Unsatisfied);
        }
        assert!(!ctx.cache_enabled());
        assert_eq!(ctx.cache_hits(), 0);
    }

    #[test]
    fn test_cache_skipped_while_removing() {
        let config = ResolverConfig::default();
        let db = SqliteDatabase::open_in_memory().unwrap();
        let offset = db
            .insert_package(&PackageHeader::builder("zlib", "1.3-1").build().unwrap())
            .unwrap();
        let available = AvailableIndex::new();
        let removed: BTreeSet<u32> = [offset].into_iter().collect();
        let mut ctx = ResolverContext::new(&config).unwrap();
        let mut checker = DependencyChecker::new(&config, Some(&db), &available, &removed, &mut ctx);

        let status = checker.resolve(DepTag::Requires, &dep("zlib"), None).unwrap();
        assert_eq!(status, DepStatus::Unsatisfied);

        use crate::db::DependencyCache;
        assert_eq!(db.get("R zlib").unwrap(), None);
    }

    #[test]
    fn test_added_requires_and_conflicts() {
        let config = ResolverConfig::default();
        let mut available = AvailableIndex::new();
        let a = Arc::new(
            PackageHeader::builder("a", "1-1")
                .requires("b")
                .requires("missing >= 2")
                .conflicts("a")
                .conflicts("c")
                .build()
                .unwrap(),
        );
        let c = Arc::new(PackageHeader::builder("c", "1-1").build().unwrap());
        let a_files = Arc::new(a.files.clone());
        let c_files = Arc::new(c.files.clone());
        let ka = available.add(Arc::clone(&a), Arc::clone(&a_files));
        let kc = available.add(Arc::clone(&c), Arc::clone(&c_files));
        let elements = vec![
            TransactionElement::added(a, a_files, ka, false, Vec::new(), Vec::new()),
            TransactionElement::added(c, c_files, kc, false, Vec::new(), Vec::new()),
        ];

        let universe = index(vec![
            PackageHeader::builder("b", "1-1").build().unwrap(),
        ]);
        let removed = BTreeSet::new();
        let mut ctx = ResolverContext::new(&config).unwrap();
        let problems = DependencyChecker::new(&config, None, &available, &removed, &mut ctx)
            .with_universe(Some(&universe))
            .check(&elements)
            .unwrap();

        let unsat: Vec<_> = problems.of_kind(ProblemKind::UnsatisfiedRequires).collect();
        assert_eq!(unsat.len(), 2);
        assert_eq!(unsat[0].subject.as_deref(), Some("b"));
        assert_eq!(unsat[0].suggestions, vec!["b-1-1".to_string()]);
        assert_eq!(unsat[1].subject.as_deref(), Some("missing >= 2"));
        assert!(unsat[1].suggestions.is_empty());

        // "a" does not conflict with itself, but does with "c"
        let conflicts: Vec<_> = problems.of_kind(ProblemKind::Conflict).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].subject.as_deref(), Some("c"));
    }

    #[test]
    fn test_color_filtered_requires() {
        let config = ResolverConfig::default().with_transaction_color(2);
        let mut header = PackageHeader::builder("a", "1-1").build().unwrap();
        header.requires.push(dep("lib32-only").with_color(1));
        header.requires.push(dep("lib64-only").with_color(2));
        let header = Arc::new(header);
        let files = Arc::new(header.files.clone());
        let mut available = AvailableIndex::new();
        let key = available.add(Arc::clone(&header), Arc::clone(&files));
        let elements = vec![TransactionElement::added(header, files, key, false, vec![], vec![])];

        let removed = BTreeSet::new();
        let mut ctx = ResolverContext::new(&config).unwrap();
        let problems = DependencyChecker::new(&config, None, &available, &removed, &mut ctx)
            .check(&elements)
            .unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems.iter().next().unwrap().subject.as_deref(),
            Some("lib64-only")
        );
    }
}
