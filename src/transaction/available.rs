// src/transaction/available.rs

//! Index of packages added to a transaction
//!
//! Answers "which added package satisfies this dependency" by provide name
//! and, for absolute paths, by file ownership. The same structure doubles as
//! the suggestion universe.

use crate::package::{Dependency, FileSet, PackageHeader};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle of a package in an `AvailableIndex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AddedKey(usize);

impl AddedKey {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AddedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct AvailableEntry {
    header: Arc<PackageHeader>,
    files: Arc<FileSet>,
}

/// Provide and file-path index over a set of headers
#[derive(Debug, Clone, Default)]
pub struct AvailableIndex {
    entries: Vec<Option<AvailableEntry>>,
    provides: HashMap<String, Vec<AddedKey>>,
    paths: HashMap<String, Vec<AddedKey>>,
}

impl AvailableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over standalone headers (e.g. a repository universe)
    pub fn from_headers(headers: impl IntoIterator<Item = PackageHeader>) -> Self {
        let mut index = Self::new();
        for header in headers {
            let files = Arc::new(header.files.clone());
            index.add(Arc::new(header), files);
        }
        index
    }

    /// Register a package; `files` is its (possibly relocated) file list
    pub fn add(&mut self, header: Arc<PackageHeader>, files: Arc<FileSet>) -> AddedKey {
        let key = AddedKey(self.entries.len());

        for dep in &header.provides {
            let keys = self.provides.entry(dep.name.clone()).or_default();
            if keys.last() != Some(&key) {
                keys.push(key);
            }
        }
        for (index, _) in files.iter() {
            self.paths.entry(files.path(index)).or_default().push(key);
        }

        self.entries.push(Some(AvailableEntry { header, files }));
        key
    }

    /// Drop a package; its key is never reused
    pub fn remove(&mut self, key: AddedKey) {
        if let Some(slot) = self.entries.get_mut(key.0) {
            *slot = None;
        }
        for keys in self.provides.values_mut() {
            keys.retain(|k| *k != key);
        }
        for keys in self.paths.values_mut() {
            keys.retain(|k| *k != key);
        }
    }

    pub fn header(&self, key: AddedKey) -> Option<&Arc<PackageHeader>> {
        self.entries
            .get(key.0)
            .and_then(|e| e.as_ref())
            .map(|e| &e.header)
    }

    pub fn files(&self, key: AddedKey) -> Option<&Arc<FileSet>> {
        self.entries
            .get(key.0)
            .and_then(|e| e.as_ref())
            .map(|e| &e.files)
    }

    /// Number of live packages
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every package satisfying `dep`, file owners first
    pub fn all_satisfies(&self, dep: &Dependency) -> Vec<AddedKey> {
        let mut result: Vec<AddedKey> = Vec::new();

        if dep.is_file()
            && let Some(keys) = self.paths.get(&dep.name)
        {
            for key in keys {
                if !result.contains(key) {
                    result.push(*key);
                }
            }
        }

        if let Some(keys) = self.provides.get(&dep.name) {
            for key in keys {
                if result.contains(key) {
                    continue;
                }
                if self
                    .header(*key)
                    .is_some_and(|h| h.provides.any_matches(dep))
                {
                    result.push(*key);
                }
            }
        }

        result
    }

    /// First package satisfying `dep`
    pub fn satisfies(&self, dep: &Dependency) -> Option<AddedKey> {
        self.all_satisfies(dep).into_iter().next()
    }
}
