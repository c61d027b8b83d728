// src/db/mod.rs

//! Installed-package database
//!
//! The resolver only needs a narrow view of the database: headers looked up
//! by tag value, headers by offset, and installed files by basename (from
//! which fingerprint matches are derived). `PackageDatabase` is that view;
//! `SqliteDatabase` is the implementation shipped with the crate.

pub mod depcache;
pub mod lock;
pub mod schema;
pub mod sqlite;

pub use depcache::DependencyCache;
pub use lock::DatabaseLock;
pub use sqlite::SqliteDatabase;

use crate::error::{Error, Result};
use crate::filesystem::{Fingerprint, FingerprintLookup};
use crate::package::PackageHeader;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Index a header lookup goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum DbTag {
    Name,
    ProvideName,
    RequireName,
    ConflictName,
    ObsoleteName,
    /// File paths (the key is the absolute path)
    BaseNames,
}

/// An installed file found by basename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFile {
    pub db_offset: u32,
    pub file_index: usize,
    pub dirname: String,
    pub basename: String,
}

/// An installed file whose fingerprint matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMatch {
    pub db_offset: u32,
    pub file_index: usize,
}

/// Iterator over headers returned by a database lookup
///
/// Headers whose offsets were pruned are skipped; once the interrupt flag
/// is raised the iterator simply ends.
pub struct HeaderIterator {
    rows: std::vec::IntoIter<Arc<PackageHeader>>,
    pruned: HashSet<u32>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl HeaderIterator {
    pub fn new(rows: Vec<Arc<PackageHeader>>, interrupt: Option<Arc<AtomicBool>>) -> Self {
        Self {
            rows: rows.into_iter(),
            pruned: HashSet::new(),
            interrupt,
        }
    }

    /// Hide headers with these database offsets
    pub fn prune<'a>(mut self, offsets: impl IntoIterator<Item = &'a u32>) -> Self {
        self.pruned.extend(offsets);
        self
    }
}

impl Iterator for HeaderIterator {
    type Item = Arc<PackageHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self
                .interrupt
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                debug!("database iteration interrupted");
                return None;
            }
            let header = self.rows.next()?;
            if header
                .instance
                .is_some_and(|offset| self.pruned.contains(&offset))
            {
                continue;
            }
            return Some(header);
        }
    }
}

/// Read access to installed packages
pub trait PackageDatabase {
    /// Headers whose `tag` index contains `key`
    fn iter(&self, tag: DbTag, key: &str) -> Result<HeaderIterator>;

    /// Header stored at a database offset
    fn header(&self, offset: u32) -> Result<Option<Arc<PackageHeader>>>;

    /// Installed files with a given basename
    fn files_by_basename(&self, basename: &str) -> Result<Vec<InstalledFile>>;

    /// Persistent dependency result cache, if the database keeps one
    fn dependency_cache(&self) -> Option<&dyn DependencyCache> {
        None
    }

    /// On-disk location, used to place the database lock
    fn path(&self) -> Option<&Path> {
        None
    }

    /// For each fingerprint, every installed file that resolves to it
    fn find_fingerprint_matches(
        &self,
        fingerprints: &[Fingerprint],
        fpc: &mut dyn FingerprintLookup,
    ) -> Result<Vec<Vec<FileMatch>>> {
        let mut by_basename: HashMap<&str, Vec<(Fingerprint, FileMatch)>> = HashMap::new();
        let mut result = Vec::with_capacity(fingerprints.len());

        for fp in fingerprints {
            if !by_basename.contains_key(fp.basename.as_str()) {
                let mut candidates = Vec::new();
                for file in self.files_by_basename(&fp.basename)? {
                    let file_fp = fpc.lookup(&file.dirname, &file.basename)?;
                    candidates.push((
                        file_fp,
                        FileMatch {
                            db_offset: file.db_offset,
                            file_index: file.file_index,
                        },
                    ));
                }
                by_basename.insert(fp.basename.as_str(), candidates);
            }

            let matches = by_basename
                .get(fp.basename.as_str())
                .map(|candidates| {
                    candidates
                        .iter()
                        .filter(|(candidate, _)| candidate == fp)
                        .map(|(_, m)| *m)
                        .collect()
                })
                .unwrap_or_default();
            result.push(matches);
        }

        Ok(result)
    }
}

/// Create (or upgrade) a database file at the specified path
///
/// This is idempotent - calling it on an existing database is safe.
pub fn init(db_path: &Path) -> Result<Connection> {
    debug!("Initializing database at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::InitError(format!("Failed to create database directory: {}", e))
        })?;
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized at {}", db_path.display());
    Ok(conn)
}

/// Open an existing database
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound(db_path.display().to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;
    Ok(conn)
}
