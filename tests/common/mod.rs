// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use conary_txn::filesystem::FingerprintLookup;
use conary_txn::{
    FingerprintCache, MountedFilesystem, PackageHeader, ResolverConfig, SqliteDatabase,
    StaticFilesystems,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch install root with a file-backed package database below it.
///
/// Keep the value alive for the duration of the test to prevent cleanup.
pub struct TestRoot {
    pub dir: TempDir,
    pub db: SqliteDatabase,
}

impl TestRoot {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        for sub in ["etc", "usr/bin", "usr/lib", "var/lib/conary"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let db = SqliteDatabase::open(&dir.path().join("var/lib/conary/packages.db")).unwrap();
        Self { dir, db }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.path().join("var/lib/conary/packages.db")
    }

    /// Config rooted at this directory
    pub fn config(&self) -> ResolverConfig {
        ResolverConfig::default().with_root(self.path())
    }

    /// Write a file below the root
    pub fn write(&self, path: &str, content: &[u8]) {
        let full = self.path().join(path.trim_start_matches('/'));
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    /// Install a header into the database, returning its offset
    pub fn install(&self, header: &PackageHeader) -> u32 {
        self.db.insert_package(header).unwrap()
    }

    /// A single filesystem covering the root, with the given free blocks
    pub fn filesystems(&self, avail_blocks: u64) -> StaticFilesystems {
        let dev = FingerprintCache::new(self.path())
            .lookup("/usr/bin/", "probe")
            .unwrap()
            .dev;
        StaticFilesystems(vec![MountedFilesystem {
            dev,
            mount_point: "/".to_string(),
            block_size: 4096,
            avail_blocks,
            avail_inodes: 10_000,
        }])
    }
}

/// Route engine logs to the test output, honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Header with plain requires
pub fn pkg(name: &str, evr: &str, requires: &[&str]) -> PackageHeader {
    let mut builder = PackageHeader::builder(name, evr);
    for dep in requires {
        builder = builder.requires(dep);
    }
    builder.build().unwrap()
}

/// Names of the elements of a transaction, in order
pub fn names(ts: &conary_txn::TransactionSet<'_>) -> Vec<String> {
    ts.elements().iter().map(|e| e.name().to_string()).collect()
}
