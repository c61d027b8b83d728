// tests/ordering.rs

//! Install ordering through the public `TransactionSet` API.

mod common;

use common::{names, pkg};
use conary_txn::package::Sense;
use conary_txn::{PackageHeader, ResolverConfig, TransactionSet};

#[test]
fn test_acyclic_order_respects_every_edge() {
    let mut ts = TransactionSet::new(ResolverConfig::default(), None).unwrap();
    ts.add_install(pkg("app", "1-1", &["web", "db"]), false).unwrap();
    ts.add_install(pkg("web", "1-1", &["ssl", "libc"]), false).unwrap();
    ts.add_install(pkg("db", "1-1", &["libc"]), false).unwrap();
    ts.add_install(pkg("ssl", "1-1", &["libc"]), false).unwrap();
    ts.add_install(pkg("libc", "1-1", &[]), false).unwrap();

    let outcome = ts.order().unwrap();
    assert_eq!(outcome.unresolved, 0);
    assert_eq!(outcome.zapped, 0);

    let order = names(&ts);
    let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
    for (provider, requirer) in [
        ("web", "app"),
        ("db", "app"),
        ("ssl", "web"),
        ("libc", "web"),
        ("libc", "db"),
        ("libc", "ssl"),
    ] {
        assert!(
            pos(provider) < pos(requirer),
            "{} should precede {} in {:?}",
            provider,
            requirer,
            order
        );
    }
}

#[test]
fn test_no_edges_keeps_insertion_order() {
    let mut ts = TransactionSet::new(ResolverConfig::default(), None).unwrap();
    for name in ["zeta", "alpha", "mid"] {
        ts.add_install(pkg(name, "1-1", &[]), false).unwrap();
    }
    assert_eq!(ts.order().unwrap().unresolved, 0);
    assert_eq!(names(&ts), vec!["zeta", "alpha", "mid"]);

    // Already ordered, edge-free: a second run changes nothing
    assert_eq!(ts.order().unwrap().unresolved, 0);
    assert_eq!(names(&ts), vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_mutual_requires_loop_is_repaired() {
    let mut ts = TransactionSet::new(ResolverConfig::default(), None).unwrap();
    ts.add_install(pkg("pkgA", "1-1", &["pkgB"]), false).unwrap();
    ts.add_install(pkg("pkgB", "1-1", &["pkgA"]), false).unwrap();

    let outcome = ts.order().unwrap();
    assert_eq!(outcome.unresolved, 0);
    assert_eq!(outcome.zapped, 1);
    assert_eq!(outcome.loops.len(), 1);
    assert!(outcome.loops[0].severed.is_some());

    let mut order = names(&ts);
    assert_eq!(order.len(), 2);
    order.sort();
    assert_eq!(order, vec!["pkgA", "pkgB"]);
}

#[test]
fn test_prereq_loop_reports_unresolved() {
    let mut ts = TransactionSet::new(ResolverConfig::default(), None).unwrap();
    for (name, needs) in [("a", "b"), ("b", "c"), ("c", "a")] {
        ts.add_install(
            PackageHeader::builder(name, "1-1")
                .requires_with(needs, Sense::SCRIPT_PRE)
                .build()
                .unwrap(),
            false,
        )
        .unwrap();
    }

    let outcome = ts.order().unwrap();
    assert_eq!(outcome.unresolved, 3);
    assert!(!outcome.is_ordered());
    assert_eq!(names(&ts), vec!["a", "b", "c"]);
}

#[test]
fn test_rpmlib_requires_never_order() {
    let mut ts = TransactionSet::new(ResolverConfig::default(), None).unwrap();
    ts.add_install(pkg("b", "1-1", &["rpmlib(PayloadFilesHavePrefix) <= 4.0-1"]), false)
        .unwrap();
    ts.add_install(
        PackageHeader::builder("a", "1-1")
            .provides("rpmlib(PayloadFilesHavePrefix) = 4.0-1")
            .build()
            .unwrap(),
        false,
    )
    .unwrap();

    assert_eq!(ts.order().unwrap().zapped, 0);
    assert_eq!(names(&ts), vec!["b", "a"]);
}

#[test]
fn test_configured_rescan_budget() {
    let config = ResolverConfig {
        max_order_rescans: 0,
        ..Default::default()
    };
    let mut ts = TransactionSet::new(config, None).unwrap();
    ts.add_install(pkg("a", "1-1", &["b"]), false).unwrap();
    ts.add_install(pkg("b", "1-1", &["a"]), false).unwrap();

    let outcome = ts.order().unwrap();
    assert_eq!(outcome.unresolved, 2);
    assert_eq!(names(&ts), vec!["a", "b"]);
}
