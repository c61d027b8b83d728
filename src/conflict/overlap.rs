// src/conflict/overlap.rs

//! Overlapping file resolution
//!
//! Every file of every element is fingerprinted. Added elements are first
//! matched against installed files with the same fingerprint, then every
//! element is matched against earlier elements of the transaction that
//! touch the same fingerprint. The outcome is one `FileAction` per file,
//! the file conflict problems and the disk space bill.

use super::fate::{FileVersion, decide_file_fate};
use super::skip::skip_files;
use super::{FileAction, FileActions, ReplacedFile};
use crate::config::ResolverConfig;
use crate::db::PackageDatabase;
use crate::error::Result;
use crate::filesystem::{
    DiskProbe, DiskSpaceTable, FilesystemInfo, Fingerprint, FingerprintLookup, FingerprintMap,
};
use crate::hash::digests_equal;
use crate::package::{FileFlags, FileKind, FileState, PackageHeader};
use crate::transaction::element::TransactionElement;
use crate::transaction::problems::{Problem, ProblemKind, ProblemSet};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of conflict resolution
#[derive(Debug, Clone, Default)]
pub struct ResolvedFiles {
    /// One entry per element, in transaction order
    pub actions: Vec<FileActions>,
    pub disk: DiskSpaceTable,
    pub problems: ProblemSet,
}

/// Per-file bookkeeping carried between the database and overlap passes
#[derive(Debug, Clone, Default)]
struct FileAccounting {
    /// Size of the installed file this one replaces
    replaced_size: Vec<u64>,
}

/// Which side of a colored file clash is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorWinner {
    New,
    Other,
}

/// Settle a clash between two differing files by multilib color
///
/// Only files that are both colored within the transaction color, with
/// different colors, are settled; the one carrying the preferred color wins.
/// Anything else is a real conflict and yields `None`.
fn color_winner(new: u32, other: u32, tscolor: u32, prefcolor: u32) -> Option<ColorWinner> {
    let (new, other) = (new & tscolor, other & tscolor);
    if new == 0 || other == 0 || new == other {
        return None;
    }
    if new & prefcolor != 0 {
        Some(ColorWinner::New)
    } else if other & prefcolor != 0 {
        Some(ColorWinner::Other)
    } else {
        None
    }
}

/// Decides file actions for an ordered transaction
pub struct ConflictResolver<'a> {
    config: &'a ResolverConfig,
    db: Option<&'a dyn PackageDatabase>,
    /// Database offsets of the packages being removed
    removed: &'a BTreeSet<u32>,
    probe: DiskProbe,
    installed: HashMap<u32, Option<Arc<PackageHeader>>>,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(
        config: &'a ResolverConfig,
        db: Option<&'a dyn PackageDatabase>,
        removed: &'a BTreeSet<u32>,
    ) -> Self {
        Self {
            config,
            db,
            removed,
            probe: DiskProbe::new(&config.root),
            installed: HashMap::new(),
        }
    }

    /// Resolve every file of `elements`, which must already be ordered
    pub fn resolve(
        &mut self,
        elements: &[TransactionElement],
        fpc: &mut dyn FingerprintLookup,
        filesystems: &dyn FilesystemInfo,
    ) -> Result<ResolvedFiles> {
        let mut result = ResolvedFiles {
            actions: elements
                .iter()
                .map(|e| FileActions::new(e.files().len()))
                .collect(),
            disk: DiskSpaceTable::new(&filesystems.mounted_filesystems()?),
            problems: ProblemSet::new(),
        };

        for (e, element) in elements.iter().enumerate() {
            skip_files(self.config, element, &mut result.actions[e]);
        }

        let mut fingerprints: Vec<Vec<Fingerprint>> = Vec::with_capacity(elements.len());
        let mut map = FingerprintMap::new();
        for (e, element) in elements.iter().enumerate() {
            let files = element.files();
            let pairs: Vec<(&str, &str)> = files
                .iter()
                .map(|(i, f)| (files.dirname(i), f.basename.as_str()))
                .collect();
            let fps = fpc.lookup_batch(&pairs)?;
            for (i, fp) in fps.iter().enumerate() {
                map.insert(fp.clone(), e, i);
            }
            fingerprints.push(fps);
        }
        debug!(
            "fingerprinted {} paths, {} shared",
            map.len(),
            map.shared_count()
        );

        for (e, element) in elements.iter().enumerate() {
            let mut accounting = FileAccounting {
                replaced_size: vec![0; element.files().len()],
            };
            if element.is_added() {
                self.match_installed(e, element, &fingerprints[e], fpc, &mut result, &mut accounting)?;
            }
            self.resolve_overlaps(e, elements, &fingerprints[e], &map, &mut result, &accounting)?;
        }

        for shortfall in result.disk.shortfalls() {
            let (kind, filtered) = if shortfall.inodes {
                (ProblemKind::DiskNodes, self.config.filter.disk_nodes)
            } else {
                (ProblemKind::DiskSpace, self.config.filter.disk_space)
            };
            if filtered {
                continue;
            }
            let nevr = shortfall
                .element
                .and_then(|i| elements.get(i))
                .map(|e| e.nevr())
                .unwrap_or_default();
            result.problems.push(
                Problem::new(kind, nevr)
                    .with_subject(shortfall.mount_point)
                    .with_amount(shortfall.amount),
            );
        }

        info!(
            "resolved files of {} elements, {} problems",
            elements.len(),
            result.problems.len()
        );
        Ok(result)
    }

    fn installed_header(&mut self, offset: u32) -> Result<Option<Arc<PackageHeader>>> {
        if let Some(cached) = self.installed.get(&offset) {
            return Ok(cached.clone());
        }
        let header = match self.db {
            Some(db) => db.header(offset)?,
            None => None,
        };
        self.installed.insert(offset, header.clone());
        Ok(header)
    }

    /// Compare an added element's files with installed files at the same
    /// location
    fn match_installed(
        &mut self,
        e: usize,
        element: &TransactionElement,
        fingerprints: &[Fingerprint],
        fpc: &mut dyn FingerprintLookup,
        result: &mut ResolvedFiles,
        accounting: &mut FileAccounting,
    ) -> Result<()> {
        let Some(db) = self.db else {
            return Ok(());
        };
        let matches = db.find_fingerprint_matches(fingerprints, fpc)?;
        let files = element.files();
        let tscolor = self.config.transaction_color;
        let prefcolor = self.config.preferred_color;

        // Group by owning package so each installed header is loaded once
        let mut shared: Vec<(u32, usize, usize)> = Vec::new();
        for (i, file_matches) in matches.iter().enumerate() {
            for m in file_matches {
                shared.push((m.db_offset, i, m.file_index));
            }
        }
        shared.sort_unstable();

        for (db_offset, i, other_index) in shared {
            let Some(other) = self.installed_header(db_offset)? else {
                continue;
            };
            let Some(other_file) = other.files.get(other_index) else {
                continue;
            };
            let Some(file) = files.get(i) else {
                continue;
            };
            if other_file.state != FileState::Normal {
                continue;
            }
            let actions = &mut result.actions[e];
            if actions.get(i).is_skipping() {
                continue;
            }

            let being_removed = self.removed.contains(&db_offset);
            let is_config = other_file.is_config() || file.is_config();

            if files.files_differ(i, &other.files, other_index) {
                let mut report = !(being_removed || self.config.filter.replace_old_files);
                match color_winner(file.color, other_file.color, tscolor, prefcolor) {
                    Some(ColorWinner::New) => {
                        actions.set(i, FileAction::Create);
                        report = false;
                    }
                    Some(ColorWinner::Other) => {
                        actions.set(i, FileAction::SkipColor);
                        report = false;
                    }
                    None => {}
                }
                if report {
                    result.problems.push(
                        Problem::new(ProblemKind::FileConflict, element.nevr())
                            .with_alt(other.nevr())
                            .with_subject(files.path(i)),
                    );
                }
                if !(is_config || actions.get(i).is_skipping()) && !being_removed {
                    actions.push_replaced(ReplacedFile {
                        db_offset,
                        file_index: other_index,
                    });
                }
            }

            if is_config {
                let action = decide_file_fate(
                    &self.probe,
                    &files.path(i),
                    FileVersion::new(other_file, other.files.digest_algo),
                    FileVersion::new(file, files.digest_algo),
                    !self.config.all_files,
                )?;
                debug!("{}: config {} -> {}", element.nevr(), files.path(i), action);
                actions.set(i, action);
            }

            accounting.replaced_size[i] = other_file.size;
        }
        Ok(())
    }

    /// Settle files shared with other elements of the transaction and
    /// charge the disk
    fn resolve_overlaps(
        &self,
        e: usize,
        elements: &[TransactionElement],
        fingerprints: &[Fingerprint],
        map: &FingerprintMap,
        result: &mut ResolvedFiles,
        accounting: &FileAccounting,
    ) -> Result<()> {
        let element = &elements[e];
        let files = element.files();
        let tscolor = self.config.transaction_color;
        let prefcolor = self.config.preferred_color;

        for (i, file) in files.iter() {
            if result.actions[e].get(i).is_skipping() {
                continue;
            }
            let fp = &fingerprints[i];
            let owners = map.owners(fp);
            let path = files.path(i);
            let mut fixup_size = 0;

            if element.is_added() {
                let position = owners
                    .iter()
                    .position(|&(oe, of)| oe == e && of == i)
                    .unwrap_or(owners.len());
                let previous = owners[..position].iter().rev().copied().find(|&(oe, of)| {
                    elements[oe].is_added() && result.actions[oe].get(of) != FileAction::Unknown
                });

                let on_disk_config = file.is_config()
                    && self.probe.differs_from(&path, file, files.digest_algo)?;
                let noreplace = file.flags.contains(FileFlags::NOREPLACE);

                if let Some((oe, of)) = previous {
                    let other = &elements[oe];
                    let other_files = other.files();

                    if files.files_differ(i, other_files, of) {
                        let other_color = other_files.get(of).map(|f| f.color).unwrap_or(0);
                        match color_winner(file.color, other_color, tscolor, prefcolor) {
                            Some(ColorWinner::New) => {
                                result.actions[oe].set(of, FileAction::SkipColor);
                                result.actions[e].set(i, FileAction::Create);
                            }
                            Some(ColorWinner::Other) => {
                                result.actions[e].set(i, FileAction::SkipColor);
                            }
                            None if !self.config.filter.replace_new_files => {
                                result.problems.push(
                                    Problem::new(ProblemKind::NewFileConflict, element.nevr())
                                        .with_alt(other.nevr())
                                        .with_subject(path.clone()),
                                );
                            }
                            None => {}
                        }
                    }

                    fixup_size = other_files.get(of).map(|f| f.size).unwrap_or(0);

                    if on_disk_config {
                        let action = if noreplace {
                            FileAction::AltName
                        } else {
                            FileAction::Skip
                        };
                        result.actions[e].set(i, action);
                    }
                } else if on_disk_config && result.actions[e].get(i) == FileAction::Unknown {
                    let action = if noreplace {
                        FileAction::AltName
                    } else {
                        FileAction::Backup
                    };
                    result.actions[e].set(i, action);
                }

                if result.actions[e].get(i) == FileAction::Unknown {
                    result.actions[e].set(i, FileAction::Create);
                }
            } else {
                let added_owner = owners.iter().any(|&(oe, _)| elements[oe].is_added());
                let earlier_removed = owners
                    .iter()
                    .take_while(|&&(oe, of)| !(oe == e && of == i))
                    .any(|&(oe, _)| elements[oe].is_removed());

                let action = if added_owner || earlier_removed {
                    FileAction::Skip
                } else if file.state != FileState::Normal {
                    FileAction::Skip
                } else if !(file.kind() == FileKind::Regular && file.is_config()) {
                    FileAction::Erase
                } else {
                    let on_disk = self.probe.digest(&path, files.digest_algo)?;
                    match (&on_disk, &file.digest) {
                        (Some(d), Some(recorded)) if !digests_equal(d, recorded) => {
                            FileAction::Backup
                        }
                        _ => FileAction::Erase,
                    }
                };
                result.actions[e].set(i, action);
            }

            let action = result.actions[e].get(i);
            result.disk.account(
                e,
                fp.dev,
                file.size,
                accounting.replaced_size[i],
                fixup_size,
                action,
            );
        }
        Ok(())
    }
}
