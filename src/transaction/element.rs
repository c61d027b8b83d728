// src/transaction/element.rs

//! Transaction elements
//!
//! One element per package being installed or erased. Elements share their
//! header with the available index and the database through `Arc`; the
//! file list is owned separately because relocation rewrites it.

use super::available::AddedKey;
use crate::package::{DependencySet, FileSet, PackageHeader, Relocation};
use serde::Serialize;
use std::sync::Arc;

/// What happens to an element's package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Package being installed; `key` is its handle in the available index
    Added { key: AddedKey },
    /// Installed package being erased
    Removed {
        /// Set when the erase is the second half of an upgrade
        depends_on: Option<AddedKey>,
        db_offset: u32,
    },
}

/// `+` / `-` for logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Added,
    Removed,
}

/// One package of a transaction
#[derive(Debug, Clone)]
pub struct TransactionElement {
    header: Arc<PackageHeader>,
    files: Arc<FileSet>,
    kind: ElementKind,
    /// Added in upgrade mode
    upgrade: bool,
    relocations: Vec<Relocation>,
    /// Relocations whose old prefix is not relocatable
    bad_relocations: Vec<Relocation>,
}

impl TransactionElement {
    pub(crate) fn added(
        header: Arc<PackageHeader>,
        files: Arc<FileSet>,
        key: AddedKey,
        upgrade: bool,
        relocations: Vec<Relocation>,
        bad_relocations: Vec<Relocation>,
    ) -> Self {
        Self {
            header,
            files,
            kind: ElementKind::Added { key },
            upgrade,
            relocations,
            bad_relocations,
        }
    }

    pub(crate) fn removed(
        header: Arc<PackageHeader>,
        db_offset: u32,
        depends_on: Option<AddedKey>,
    ) -> Self {
        let files = Arc::new(header.files.clone());
        Self {
            header,
            files,
            kind: ElementKind::Removed {
                depends_on,
                db_offset,
            },
            upgrade: false,
            relocations: Vec::new(),
            bad_relocations: Vec::new(),
        }
    }

    pub fn header(&self) -> &Arc<PackageHeader> {
        &self.header
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn element_type(&self) -> ElementType {
        match self.kind {
            ElementKind::Added { .. } => ElementType::Added,
            ElementKind::Removed { .. } => ElementType::Removed,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self.kind, ElementKind::Added { .. })
    }

    pub fn is_removed(&self) -> bool {
        matches!(self.kind, ElementKind::Removed { .. })
    }

    /// Available index handle of an added element
    pub fn added_key(&self) -> Option<AddedKey> {
        match self.kind {
            ElementKind::Added { key } => Some(key),
            ElementKind::Removed { .. } => None,
        }
    }

    /// Database offset of a removed element
    pub fn db_offset(&self) -> Option<u32> {
        match self.kind {
            ElementKind::Removed { db_offset, .. } => Some(db_offset),
            ElementKind::Added { .. } => None,
        }
    }

    /// Added element this erase belongs to
    pub fn depends_on(&self) -> Option<AddedKey> {
        match self.kind {
            ElementKind::Removed { depends_on, .. } => depends_on,
            ElementKind::Added { .. } => None,
        }
    }

    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn arch(&self) -> &str {
        &self.header.arch
    }

    pub fn os(&self) -> &str {
        &self.header.os
    }

    pub fn nevr(&self) -> String {
        self.header.nevr()
    }

    pub fn nevra(&self) -> String {
        self.header.nevra()
    }

    pub fn color(&self) -> u32 {
        self.header.color
    }

    pub fn provides(&self) -> &DependencySet {
        &self.header.provides
    }

    pub fn requires(&self) -> &DependencySet {
        &self.header.requires
    }

    pub fn conflicts(&self) -> &DependencySet {
        &self.header.conflicts
    }

    pub fn obsoletes(&self) -> &DependencySet {
        &self.header.obsoletes
    }

    /// File list after relocation
    pub fn files(&self) -> &Arc<FileSet> {
        &self.files
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn bad_relocations(&self) -> &[Relocation] {
        &self.bad_relocations
    }
}
