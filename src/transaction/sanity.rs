// src/transaction/sanity.rs

//! Pre-flight checks on added packages
//!
//! Architecture and OS compatibility, reinstalls, downgrades and unusable
//! relocations. Every check can be silenced through the problem filter.

use super::element::TransactionElement;
use super::problems::{Problem, ProblemKind, ProblemSet};
use crate::config::ResolverConfig;
use crate::db::{DbTag, PackageDatabase};
use crate::error::Result;
use std::cmp::Ordering;
use tracing::debug;

fn arch_compatible(a: &str, b: &str) -> bool {
    a == b || a == "noarch" || b == "noarch"
}

/// Run every sanity check against one added element
pub(crate) fn check_element(
    element: &TransactionElement,
    config: &ResolverConfig,
    db: Option<&dyn PackageDatabase>,
    problems: &mut ProblemSet,
) -> Result<()> {
    if !element.is_added() {
        return Ok(());
    }
    let filter = &config.filter;
    let nevr = element.nevr();

    if !filter.ignore_arch
        && element.arch() != "noarch"
        && !config.compat_arches.is_empty()
        && !config.compat_arches.iter().any(|a| a == element.arch())
    {
        problems.push(Problem::new(ProblemKind::BadArch, &nevr).with_subject(element.arch()));
    }

    if !filter.ignore_os
        && !config.compat_os.is_empty()
        && !config
            .compat_os
            .iter()
            .any(|os| os.eq_ignore_ascii_case(element.os()))
    {
        problems.push(Problem::new(ProblemKind::BadOs, &nevr).with_subject(element.os()));
    }

    for reloc in element.bad_relocations() {
        problems.push(
            Problem::new(ProblemKind::BadRelocate, &nevr).with_subject(reloc.old_prefix.clone()),
        );
    }

    let Some(db) = db else {
        return Ok(());
    };

    for installed in db.iter(DbTag::Name, element.name())? {
        if !arch_compatible(&installed.arch, element.arch()) {
            continue;
        }

        if installed.same_nevra(element.header()) {
            if !filter.replace_pkg {
                debug!("{} is already installed", element.nevra());
                problems.push(
                    Problem::new(ProblemKind::AlreadyInstalled, &nevr)
                        .with_alt(installed.nevr()),
                );
            }
            continue;
        }

        if element.is_upgrade()
            && !filter.old_package
            && installed.compare_version(element.header()) == Ordering::Greater
        {
            problems.push(Problem::new(ProblemKind::OldPackage, &nevr).with_alt(installed.nevr()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProblemFilter;
    use crate::db::SqliteDatabase;
    use crate::package::{PackageHeader, Relocation};
    use crate::transaction::available::AvailableIndex;
    use std::sync::Arc;

    fn added(header: PackageHeader, upgrade: bool, bad: Vec<Relocation>) -> TransactionElement {
        let header = Arc::new(header);
        let files = Arc::new(header.files.clone());
        let key = AvailableIndex::new().add(Arc::clone(&header), Arc::clone(&files));
        TransactionElement::added(header, files, key, upgrade, Vec::new(), bad)
    }

    #[test]
    fn test_arch_and_os() {
        let config = ResolverConfig {
            compat_arches: vec!["x86_64".to_string()],
            compat_os: vec!["linux".to_string()],
            ..Default::default()
        };
        let mut problems = ProblemSet::new();

        let bad = added(
            PackageHeader::builder("a", "1-1").arch("ppc64").os("aix").build().unwrap(),
            false,
            Vec::new(),
        );
        check_element(&bad, &config, None, &mut problems).unwrap();
        assert_eq!(problems.count(ProblemKind::BadArch), 1);
        assert_eq!(problems.count(ProblemKind::BadOs), 1);

        let mut problems = ProblemSet::new();
        let noarch = added(
            PackageHeader::builder("b", "1-1").arch("noarch").os("Linux").build().unwrap(),
            false,
            Vec::new(),
        );
        check_element(&noarch, &config, None, &mut problems).unwrap();
        assert!(problems.is_empty());

        let filtered = config.with_filter(ProblemFilter {
            ignore_arch: true,
            ignore_os: true,
            ..Default::default()
        });
        let mut problems = ProblemSet::new();
        check_element(&bad, &filtered, None, &mut problems).unwrap();
        assert!(problems.is_empty());
    }

    #[test]
    fn test_installed_checks() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.insert_package(&PackageHeader::builder("a", "2.0-1").build().unwrap())
            .unwrap();
        let config = ResolverConfig::default();

        let mut problems = ProblemSet::new();
        let same = added(PackageHeader::builder("a", "2.0-1").build().unwrap(), false, vec![]);
        check_element(&same, &config, Some(&db), &mut problems).unwrap();
        assert_eq!(problems.count(ProblemKind::AlreadyInstalled), 1);

        let mut problems = ProblemSet::new();
        let older = added(PackageHeader::builder("a", "1.0-1").build().unwrap(), true, vec![]);
        check_element(&older, &config, Some(&db), &mut problems).unwrap();
        let old: Vec<_> = problems.of_kind(ProblemKind::OldPackage).collect();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].alt_nevr.as_deref(), Some("a-2.0-1"));

        // Plain installs of an older version are not downgrades
        let mut problems = ProblemSet::new();
        let older = added(PackageHeader::builder("a", "1.0-1").build().unwrap(), false, vec![]);
        check_element(&older, &config, Some(&db), &mut problems).unwrap();
        assert!(problems.is_empty());
    }

    #[test]
    fn test_bad_relocation() {
        let mut problems = ProblemSet::new();
        let e = added(
            PackageHeader::builder("a", "1-1").build().unwrap(),
            false,
            vec![Relocation::new("/usr", "/opt")],
        );
        check_element(&e, &ResolverConfig::default(), None, &mut problems).unwrap();
        let p: Vec<_> = problems.of_kind(ProblemKind::BadRelocate).collect();
        assert_eq!(p[0].subject.as_deref(), Some("/usr"));
    }
}
