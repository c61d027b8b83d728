// tests/file_conflicts.rs

//! End-to-end `prepare()` runs: file actions, conflicts and disk space.

mod common;

use common::TestRoot;
use conary_txn::hash::hash_bytes;
use conary_txn::{
    ElementType, FileAction, FileEntry, FileFlags, HashAlgorithm, PackageHeader, ProblemKind,
    TransactionSet,
};

fn sha(content: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, content)
}

#[test]
fn test_two_new_packages_same_path() {
    let root = TestRoot::new();
    let mut ts = TransactionSet::new(root.config(), Some(&root.db)).unwrap();
    ts.add_install(
        PackageHeader::builder("left", "1-1")
            .file("/usr/bin/shared", FileEntry::regular(8192, sha(b"left")))
            .build()
            .unwrap(),
        false,
    )
    .unwrap();
    ts.add_install(
        PackageHeader::builder("right", "1-1")
            .file("/usr/bin/shared", FileEntry::regular(8192, sha(b"right")))
            .build()
            .unwrap(),
        false,
    )
    .unwrap();

    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();

    let conflicts: Vec<_> = report.problems.file_conflicts().collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].pkg_nevr, "right-1-1");
    assert_eq!(conflicts[0].alt_nevr.as_deref(), Some("left-1-1"));
    assert_eq!(conflicts[0].subject.as_deref(), Some("/usr/bin/shared"));

    assert_eq!(report.disk.len(), 1);
    assert_eq!(report.disk[0].net_blocks(), 2);
}

#[test]
fn test_multilib_transaction_keeps_uncolored_conflicts() {
    let root = TestRoot::new();
    let mut config = root.config();
    config.transaction_color = 3;

    let mut ts = TransactionSet::new(config, Some(&root.db)).unwrap();
    for (name, content) in [("left", b"left".as_slice()), ("right", b"right".as_slice())] {
        ts.add_install(
            PackageHeader::builder(name, "1-1")
                .file("/etc/motd", FileEntry::regular(8, sha(content)))
                .build()
                .unwrap(),
            false,
        )
        .unwrap();
    }

    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    assert_eq!(report.problems.count(ProblemKind::NewFileConflict), 1);
}

#[test]
fn test_identical_config_on_disk_is_created() {
    let root = TestRoot::new();
    root.write("/etc/app.conf", b"same");

    let mut ts = TransactionSet::new(root.config(), Some(&root.db)).unwrap();
    ts.add_install(
        PackageHeader::builder("app", "1-1")
            .file("/etc/app.conf", FileEntry::config(4, sha(b"same")))
            .build()
            .unwrap(),
        false,
    )
    .unwrap();

    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    assert!(report.is_clean(), "{}", report.problems);
    assert_eq!(report.order[0].files[0].action, FileAction::Create);
}

#[test]
fn test_upgrade_preserves_modified_config() {
    let root = TestRoot::new();
    root.write("/etc/app.conf", b"locally edited");
    root.write("/etc/keep.conf", b"locally edited");
    root.write("/etc/plain.conf", b"pristine");
    root.install(
        &PackageHeader::builder("app", "1-1")
            .file("/etc/app.conf", FileEntry::config(8, sha(b"pristine")))
            .file("/etc/keep.conf", FileEntry::config(8, sha(b"pristine")))
            .file("/etc/plain.conf", FileEntry::config(8, sha(b"pristine")))
            .file("/usr/bin/app-old", FileEntry::regular(10, sha(b"old")))
            .build()
            .unwrap(),
    );

    let mut ts = TransactionSet::new(root.config(), Some(&root.db)).unwrap();
    ts.add_install(
        PackageHeader::builder("app", "2-1")
            .file("/etc/app.conf", FileEntry::config(5, sha(b"fresh")))
            .file("/etc/keep.conf", FileEntry::noreplace(5, sha(b"fresh")))
            .file("/etc/plain.conf", FileEntry::config(5, sha(b"fresh")))
            .build()
            .unwrap(),
        true,
    )
    .unwrap();

    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    assert!(report.is_clean(), "{}", report.problems);

    assert_eq!(report.order.len(), 2);
    assert_eq!(report.order[0].kind, ElementType::Added);
    assert_eq!(report.order[1].kind, ElementType::Removed);

    let added: Vec<FileAction> = report.order[0].files.iter().map(|f| f.action).collect();
    assert_eq!(
        added,
        vec![FileAction::Backup, FileAction::AltName, FileAction::Create]
    );

    let removed: Vec<(&str, FileAction)> = report.order[1]
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.action))
        .collect();
    assert!(removed.contains(&("/etc/app.conf", FileAction::Skip)));
    assert!(removed.contains(&("/usr/bin/app-old", FileAction::Erase)));
}

#[test]
fn test_installed_owner_conflict_and_filter() {
    let root = TestRoot::new();
    root.install(
        &PackageHeader::builder("coreutils", "9.4-1")
            .file("/usr/bin/ls", FileEntry::regular(10, sha(b"gnu")))
            .build()
            .unwrap(),
    );
    let header = PackageHeader::builder("busybox", "1.36-1")
        .file("/usr/bin/ls", FileEntry::regular(10, sha(b"busybox")))
        .build()
        .unwrap();

    let mut ts = TransactionSet::new(root.config(), Some(&root.db)).unwrap();
    ts.add_install(header.clone(), false).unwrap();
    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    let conflicts: Vec<_> = report.problems.of_kind(ProblemKind::FileConflict).collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].alt_nevr.as_deref(), Some("coreutils-9.4-1"));
    assert_eq!(ts.file_actions()[0].replaced().len(), 1);

    let mut config = root.config();
    config.filter.replace_old_files = true;
    let mut ts = TransactionSet::new(config, Some(&root.db)).unwrap();
    ts.add_install(header, false).unwrap();
    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    assert_eq!(report.problems.file_conflicts().count(), 0);
}

#[test]
fn test_policy_skips_in_report() {
    let root = TestRoot::new();
    let mut config = root.config();
    config.exclude_docs = true;
    config.netshared_paths = vec!["/srv/nfs".to_string()];

    let mut ts = TransactionSet::new(config, Some(&root.db)).unwrap();
    ts.add_install(
        PackageHeader::builder("pkg", "1-1")
            .file("/usr/bin/pkg", FileEntry::regular(10, sha(b"bin")))
            .file(
                "/usr/share/doc/pkg/README",
                FileEntry::regular(10, sha(b"doc")).with_flags(FileFlags::DOC),
            )
            .file("/srv/nfs/pkg.dat", FileEntry::regular(10, sha(b"dat")))
            .build()
            .unwrap(),
        false,
    )
    .unwrap();

    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    let actions: Vec<FileAction> = report.order[0].files.iter().map(|f| f.action).collect();
    assert_eq!(
        actions,
        vec![
            FileAction::Create,
            FileAction::SkipNoState,
            FileAction::SkipNetShared
        ]
    );
}

#[test]
fn test_disk_space_problem() {
    let root = TestRoot::new();
    let mut ts = TransactionSet::new(root.config(), Some(&root.db)).unwrap();
    ts.add_install(
        PackageHeader::builder("huge", "1-1")
            .file("/usr/lib/huge.bin", FileEntry::regular(1 << 30, sha(b"huge")))
            .build()
            .unwrap(),
        false,
    )
    .unwrap();

    let report = ts.prepare(&root.filesystems(100)).unwrap();
    let disk: Vec<_> = report.problems.of_kind(ProblemKind::DiskSpace).collect();
    assert_eq!(disk.len(), 1);
    assert_eq!(disk[0].pkg_nevr, "huge-1-1");
    assert!(disk[0].amount > 0);
    assert!(!report.is_clean());
}

#[test]
fn test_unordered_transaction_skips_file_resolution() {
    let root = TestRoot::new();
    let mut config = root.config();
    config.max_order_rescans = 0;

    let mut ts = TransactionSet::new(config, Some(&root.db)).unwrap();
    for (name, needs) in [("a", "b"), ("b", "a")] {
        ts.add_install(
            PackageHeader::builder(name, "1-1")
                .requires(needs)
                .file(&format!("/usr/bin/{}", name), FileEntry::regular(1, sha(name.as_bytes())))
                .build()
                .unwrap(),
            false,
        )
        .unwrap();
    }

    let report = ts.prepare(&root.filesystems(1_000_000)).unwrap();
    assert_eq!(report.outcome.unresolved, 2);
    assert!(report.disk.is_empty());
    assert!(
        report
            .order
            .iter()
            .flat_map(|e| e.files.iter())
            .all(|f| f.action == FileAction::Unknown)
    );

    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["outcome"]["unresolved"], 2);
}
