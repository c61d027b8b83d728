// src/filesystem/fingerprint.rs

//! File fingerprints
//!
//! Two package paths name the same file when they resolve to the same
//! directory on disk, even if spelled differently (`/lib/foo` vs
//! `/usr/lib/foo` behind a symlinked `/lib`). A fingerprint is the
//! `(device, inode)` of the nearest existing ancestor directory, the part of
//! the directory path below it that does not exist yet, and the basename.

use super::path::{normalize_dir, split_last};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Canonical, comparable identity of a file path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    /// Device of the nearest existing directory
    pub dev: u64,
    /// Inode of the nearest existing directory
    pub ino: u64,
    /// Missing directories between that directory and the file
    pub subdir: Option<String>,
    pub basename: String,
}

/// Computes fingerprints for `(dirname, basename)` pairs
pub trait FingerprintLookup {
    fn lookup(&mut self, dirname: &str, basename: &str) -> Result<Fingerprint>;

    /// Fingerprint many pairs at once
    fn lookup_batch(&mut self, pairs: &[(&str, &str)]) -> Result<Vec<Fingerprint>> {
        pairs
            .iter()
            .map(|(dir, base)| self.lookup(dir, base))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct DirIdentity {
    dev: u64,
    ino: u64,
    subdir: Option<String>,
}

/// Fingerprint cache backed by `stat(2)` below an install root
///
/// Directory identities are cached by their normalized name, so each
/// directory is stat'ed at most once per cache.
#[derive(Debug)]
pub struct FingerprintCache {
    root: PathBuf,
    dirs: HashMap<String, DirIdentity>,
}

impl FingerprintCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of cached directories
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    fn resolve_dir(&mut self, dir: &str) -> Result<DirIdentity> {
        if let Some(id) = self.dirs.get(dir) {
            return Ok(id.clone());
        }

        let mut current = dir.to_string();
        let mut missing: Vec<String> = Vec::new();

        let (dev, ino) = loop {
            let full = super::path::under_root(&self.root, &current)?;
            match std::fs::metadata(&full) {
                Ok(md) => break (md.dev(), md.ino()),
                Err(e) if is_missing(&e) => match split_last(&current) {
                    Some((parent, last)) => {
                        missing.push(last);
                        current = parent;
                    }
                    None => {
                        return Err(Error::LookupError(format!(
                            "install root {} does not exist",
                            self.root.display()
                        )));
                    }
                },
                Err(e) => {
                    return Err(Error::LookupError(format!(
                        "cannot stat {}: {}",
                        full.display(),
                        e
                    )));
                }
            }
        };

        missing.reverse();
        let id = DirIdentity {
            dev,
            ino,
            subdir: (!missing.is_empty()).then(|| missing.join("/")),
        };
        debug!(
            "fingerprint dir {} -> {}:{} {:?}",
            dir, id.dev, id.ino, id.subdir
        );
        self.dirs.insert(dir.to_string(), id.clone());
        Ok(id)
    }
}

fn is_missing(e: &io::Error) -> bool {
    // ENOTDIR shows up when an ancestor is a regular file
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(nix::libc::ENOTDIR)
}

impl FingerprintLookup for FingerprintCache {
    fn lookup(&mut self, dirname: &str, basename: &str) -> Result<Fingerprint> {
        let dir = normalize_dir(dirname);
        let id = self.resolve_dir(&dir)?;
        Ok(Fingerprint {
            dev: id.dev,
            ino: id.ino,
            subdir: id.subdir,
            basename: basename.to_string(),
        })
    }
}

/// Transaction-wide map from fingerprint to the `(element, file)` pairs
/// touching it, in transaction order
#[derive(Debug, Default)]
pub struct FingerprintMap {
    entries: HashMap<Fingerprint, Vec<(usize, usize)>>,
}

impl FingerprintMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that file `file` of element `element` has `fp`
    pub fn insert(&mut self, fp: Fingerprint, element: usize, file: usize) {
        self.entries.entry(fp).or_default().push((element, file));
    }

    /// All owners of a fingerprint, in insertion order
    pub fn owners(&self, fp: &Fingerprint) -> &[(usize, usize)] {
        self.entries.get(fp).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fingerprints touched by more than one file
    pub fn shared_count(&self) -> usize {
        self.entries.values().filter(|v| v.len() > 1).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
