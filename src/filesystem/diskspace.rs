// src/filesystem/diskspace.rs

//! Per-filesystem disk space accounting
//!
//! Every resolved file action charges or credits the filesystem the file
//! lives on. Charges only ever grow `blocks_needed`/`inodes_needed`; credits
//! (replaced files, superseded transaction files, erased files) accumulate
//! separately so the check can work on the net amount.

use super::mounts::MountedFilesystem;
use crate::conflict::FileAction;
use serde::Serialize;
use tracing::debug;

/// Slack applied to the net requirement: 5%
const SLACK_NUMERATOR: u64 = 21;
const SLACK_DENOMINATOR: u64 = 20;

/// Usage of one filesystem by the transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskSpaceInfo {
    pub dev: u64,
    pub mount_point: String,
    pub block_size: u64,
    pub blocks_available: u64,
    pub inodes_available: u64,
    pub blocks_needed: u64,
    pub inodes_needed: u64,
    pub blocks_freed: u64,
    pub inodes_freed: u64,
    /// Element whose charge last touched this filesystem
    #[serde(skip)]
    pub last_charged_by: Option<usize>,
}

/// A filesystem that would overflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub mount_point: String,
    pub element: Option<usize>,
    /// Missing bytes (blocks) or inodes
    pub amount: u64,
    pub inodes: bool,
}

impl DiskSpaceInfo {
    pub fn new(fs: &MountedFilesystem) -> Self {
        Self {
            dev: fs.dev,
            mount_point: fs.mount_point.clone(),
            block_size: fs.block_size.max(1),
            blocks_available: fs.avail_blocks,
            inodes_available: fs.avail_inodes,
            blocks_needed: 0,
            inodes_needed: 0,
            blocks_freed: 0,
            inodes_freed: 0,
            last_charged_by: None,
        }
    }

    /// Size rounded up to whole blocks
    #[inline]
    pub fn block_round(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size)
    }

    fn charge(&mut self, size: u64) {
        self.blocks_needed += self.block_round(size);
        self.inodes_needed += 1;
    }

    fn credit(&mut self, size: u64) {
        self.blocks_freed += self.block_round(size);
        self.inodes_freed += 1;
    }

    /// Blocks needed after credits
    pub fn net_blocks(&self) -> u64 {
        self.blocks_needed.saturating_sub(self.blocks_freed)
    }

    /// Inodes needed after credits
    pub fn net_inodes(&self) -> u64 {
        self.inodes_needed.saturating_sub(self.inodes_freed)
    }

    fn adjusted(n: u64) -> u64 {
        n * SLACK_NUMERATOR / SLACK_DENOMINATOR
    }

    /// Missing blocks, if the net requirement overflows
    pub fn block_shortfall(&self) -> Option<u64> {
        let adj = Self::adjusted(self.net_blocks());
        (adj > self.blocks_available).then(|| adj - self.blocks_available)
    }

    /// Missing inodes, if the net requirement overflows
    pub fn inode_shortfall(&self) -> Option<u64> {
        let adj = Self::adjusted(self.net_inodes());
        (adj > self.inodes_available).then(|| adj - self.inodes_available)
    }
}

/// Disk usage of the whole transaction, one entry per filesystem
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiskSpaceTable {
    entries: Vec<DiskSpaceInfo>,
}

impl DiskSpaceTable {
    pub fn new(filesystems: &[MountedFilesystem]) -> Self {
        Self {
            entries: filesystems.iter().map(DiskSpaceInfo::new).collect(),
        }
    }

    pub fn entries(&self) -> &[DiskSpaceInfo] {
        &self.entries
    }

    pub fn get(&self, dev: u64) -> Option<&DiskSpaceInfo> {
        self.entries.iter().find(|e| e.dev == dev)
    }

    /// Account one resolved file
    ///
    /// `prev_size` is the size of the installed file being replaced and
    /// `fixup_size` the size of an earlier transaction file at the same
    /// location. Files on unknown devices are ignored.
    pub fn account(
        &mut self,
        element: usize,
        dev: u64,
        size: u64,
        prev_size: u64,
        fixup_size: u64,
        action: FileAction,
    ) {
        let Some(dsi) = self.entries.iter_mut().find(|e| e.dev == dev) else {
            return;
        };

        match action {
            FileAction::Backup | FileAction::Save | FileAction::AltName => {
                dsi.charge(size);
                dsi.last_charged_by = Some(element);
            }
            FileAction::Create => {
                dsi.charge(size);
                dsi.last_charged_by = Some(element);
                if prev_size > 0 {
                    dsi.credit(prev_size);
                }
            }
            FileAction::Erase => dsi.credit(size),
            _ => {}
        }

        if fixup_size > 0 {
            dsi.credit(fixup_size);
        }
    }

    /// Every filesystem that would run out of blocks or inodes
    pub fn shortfalls(&self) -> Vec<Shortfall> {
        let mut result = Vec::new();
        for dsi in &self.entries {
            debug!(
                "{}: needed {} freed {} of {} blocks, needed {} freed {} of {} inodes",
                dsi.mount_point,
                dsi.blocks_needed,
                dsi.blocks_freed,
                dsi.blocks_available,
                dsi.inodes_needed,
                dsi.inodes_freed,
                dsi.inodes_available
            );
            if let Some(blocks) = dsi.block_shortfall() {
                result.push(Shortfall {
                    mount_point: dsi.mount_point.clone(),
                    element: dsi.last_charged_by,
                    amount: blocks * dsi.block_size,
                    inodes: false,
                });
            }
            if let Some(inodes) = dsi.inode_shortfall() {
                result.push(Shortfall {
                    mount_point: dsi.mount_point.clone(),
                    element: dsi.last_charged_by,
                    amount: inodes,
                    inodes: true,
                });
            }
        }
        result
    }
}
