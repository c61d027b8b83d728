// src/conflict/fate.rs

//! Config file fate
//!
//! When a package replaces a config file that is already on disk, the
//! outcome depends on three versions of the file: the one recorded for the
//! installed package, the one in the new package and the one actually on
//! disk. The rule is to preserve local modifications unless the file was
//! untouched or the packaged versions agree.

use super::FileAction;
use crate::error::Result;
use crate::filesystem::DiskProbe;
use crate::hash::{HashAlgorithm, digests_equal};
use crate::package::{FileEntry, FileFlags, FileKind};

/// One packaged version of a file, with the digest algorithm of its package
#[derive(Debug, Clone, Copy)]
pub struct FileVersion<'a> {
    pub entry: &'a FileEntry,
    pub algo: HashAlgorithm,
}

impl<'a> FileVersion<'a> {
    pub fn new(entry: &'a FileEntry, algo: HashAlgorithm) -> Self {
        Self { entry, algo }
    }
}

fn same_digest(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if digests_equal(a, b))
}

/// Decide what to do with the file at `path` when `old` is replaced by `new`
///
/// With `skip_missing`, a file that is gone from disk and marked
/// `%missingok` stays gone.
pub fn decide_file_fate(
    probe: &DiskProbe,
    path: &str,
    old: FileVersion<'_>,
    new: FileVersion<'_>,
    skip_missing: bool,
) -> Result<FileAction> {
    let new_flags = new.entry.flags;
    let save = if new_flags.contains(FileFlags::NOREPLACE) {
        FileAction::AltName
    } else {
        FileAction::Save
    };
    let modified = if new_flags.contains(FileFlags::NOREPLACE) {
        FileAction::AltName
    } else {
        FileAction::Backup
    };

    if new.entry.is_ghost() {
        return Ok(FileAction::Skip);
    }

    let Some(disk_kind) = probe.kind(path)? else {
        if skip_missing && new_flags.contains(FileFlags::MISSINGOK) {
            return Ok(FileAction::Skip);
        }
        return Ok(FileAction::Create);
    };

    let db_kind = old.entry.kind();
    let new_kind = new.entry.kind();

    if new_kind == FileKind::Directory {
        return Ok(FileAction::Create);
    }
    if disk_kind != new_kind && db_kind != FileKind::Regular && db_kind != FileKind::Symlink {
        return Ok(save);
    }
    if new_kind != db_kind && disk_kind != db_kind {
        return Ok(save);
    }
    if db_kind != new_kind {
        return Ok(FileAction::Create);
    }

    match db_kind {
        FileKind::Regular => {
            let Some(on_disk) = probe.digest(path, old.algo)? else {
                // Unreadable counts as removed
                return Ok(FileAction::Create);
            };
            let old_digest = old.entry.digest.as_deref();
            if same_digest(old_digest, Some(&on_disk)) {
                return Ok(FileAction::Create);
            }
            if old.algo == new.algo && same_digest(old_digest, new.entry.digest.as_deref()) {
                return Ok(FileAction::Skip);
            }
            let on_disk_new = if new.algo == old.algo {
                Some(on_disk)
            } else {
                probe.digest(path, new.algo)?
            };
            if same_digest(on_disk_new.as_deref(), new.entry.digest.as_deref()) {
                return Ok(FileAction::Create);
            }
        }
        FileKind::Symlink => {
            let Some(target) = probe.link_target(path)? else {
                return Ok(FileAction::Create);
            };
            let old_target = old.entry.link_to.as_deref();
            if old_target == Some(target.as_str()) {
                return Ok(FileAction::Create);
            }
            if old_target.is_some() && old_target == new.entry.link_to.as_deref() {
                return Ok(FileAction::Skip);
            }
            if new.entry.link_to.as_deref() == Some(target.as_str()) {
                return Ok(FileAction::Create);
            }
        }
        _ => return Ok(FileAction::Create),
    }

    Ok(modified)
}
