// src/conflict/mod.rs

//! File ownership and conflict resolution
//!
//! Decides, for every file of every element, what the installer has to do
//! with it. Runs after ordering, in three steps:
//!
//! - `skip`: policy pre-pass (colors, netshared paths, languages, docs,
//!   configs) marking files that will not be touched at all
//! - `overlap`: fingerprints every file, matches against the installed
//!   database and against earlier elements, raises file conflicts and
//!   charges disk space
//! - `fate`: the decision table for config files that already exist on disk

pub mod fate;
pub mod overlap;
pub mod skip;

pub use fate::{FileVersion, decide_file_fate};
pub use overlap::{ConflictResolver, ResolvedFiles};
pub use skip::skip_files;

use serde::Serialize;

/// What the installer does with one file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    /// Not decided yet
    #[default]
    Unknown,
    /// Write the packaged file
    Create,
    /// Leave whatever is on disk alone
    Skip,
    /// Rename the file on disk to `.rpmsave`-style backup, then create
    Backup,
    /// Save the file on disk before the package replaces it
    Save,
    /// Keep the file on disk, write the packaged one under a new name
    AltName,
    /// Remove the file
    Erase,
    /// Skip and record the file as not installed
    SkipNoState,
    /// Skip, the path lives on a shared network filesystem
    SkipNetShared,
    /// Skip, another multilib color wins
    SkipColor,
}

impl FileAction {
    /// True for every action that leaves the file alone
    pub fn is_skipping(self) -> bool {
        matches!(
            self,
            Self::Skip | Self::SkipNoState | Self::SkipNetShared | Self::SkipColor
        )
    }
}

/// An installed file an element overwrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReplacedFile {
    pub db_offset: u32,
    pub file_index: usize,
}

/// File actions of one element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileActions {
    actions: Vec<FileAction>,
    /// Installed files to be marked replaced once the element is installed
    replaced: Vec<ReplacedFile>,
}

impl FileActions {
    /// All files `Unknown`
    pub fn new(len: usize) -> Self {
        Self {
            actions: vec![FileAction::Unknown; len],
            replaced: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> FileAction {
        self.actions
            .get(index)
            .copied()
            .unwrap_or(FileAction::Unknown)
    }

    pub fn set(&mut self, index: usize, action: FileAction) {
        if let Some(slot) = self.actions.get_mut(index) {
            *slot = action;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, FileAction)> + '_ {
        self.actions.iter().copied().enumerate()
    }

    /// Number of files with `action`
    pub fn count(&self, action: FileAction) -> usize {
        self.actions.iter().filter(|a| **a == action).count()
    }

    pub fn replaced(&self) -> &[ReplacedFile] {
        &self.replaced
    }

    pub(crate) fn push_replaced(&mut self, file: ReplacedFile) {
        if !self.replaced.contains(&file) {
            self.replaced.push(file);
        }
    }
}
