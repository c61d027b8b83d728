// src/filesystem/mounts.rs

//! Mounted filesystem enumeration for disk-space checks

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Capacity of one mounted filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountedFilesystem {
    pub dev: u64,
    pub mount_point: String,
    pub block_size: u64,
    pub avail_blocks: u64,
    pub avail_inodes: u64,
}

/// Source of mounted filesystem information
pub trait FilesystemInfo {
    fn mounted_filesystems(&self) -> Result<Vec<MountedFilesystem>>;
}

/// Live mount table read from `/proc/self/mounts`
#[derive(Debug, Clone)]
pub struct MountTable {
    mounts_file: PathBuf,
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            mounts_file: PathBuf::from("/proc/self/mounts"),
        }
    }

    /// Read mount points from another mounts file
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_file: path.into(),
        }
    }

    fn probe(mount_point: &str) -> Option<MountedFilesystem> {
        let path = Path::new(mount_point);
        let dev = match std::fs::metadata(path) {
            Ok(md) => md.dev(),
            Err(e) => {
                debug!("skipping mount {}: {}", mount_point, e);
                return None;
            }
        };
        let stat = match nix::sys::statvfs::statvfs(path) {
            Ok(stat) => stat,
            Err(e) => {
                debug!("statvfs failed on {}: {}", mount_point, e);
                return None;
            }
        };

        let block_size = match stat.fragment_size() as u64 {
            0 => stat.block_size() as u64,
            frsize => frsize,
        };

        Some(MountedFilesystem {
            dev,
            mount_point: mount_point.to_string(),
            block_size: block_size.max(1),
            avail_blocks: stat.blocks_available() as u64,
            avail_inodes: stat.files_available() as u64,
        })
    }
}

/// Undo the octal escapes the kernel uses for spaces and tabs in mount points
fn unescape_mount_point(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

impl FilesystemInfo for MountTable {
    fn mounted_filesystems(&self) -> Result<Vec<MountedFilesystem>> {
        let content = std::fs::read_to_string(&self.mounts_file).map_err(|e| {
            Error::LookupError(format!(
                "cannot read mount table {}: {}",
                self.mounts_file.display(),
                e
            ))
        })?;

        let mut result: Vec<MountedFilesystem> = Vec::new();
        for line in content.lines() {
            let Some(raw) = line.split_whitespace().nth(1) else {
                continue;
            };
            let mount_point = unescape_mount_point(raw);
            let Some(fs) = Self::probe(&mount_point) else {
                continue;
            };
            // Overmounts share a device; the last mount is the visible one
            match result.iter_mut().find(|m| m.dev == fs.dev) {
                Some(existing) => *existing = fs,
                None => result.push(fs),
            }
        }

        debug!("found {} mounted filesystems", result.len());
        Ok(result)
    }
}

/// Fixed list of filesystems, for callers that already know their mounts
#[derive(Debug, Clone, Default)]
pub struct StaticFilesystems(pub Vec<MountedFilesystem>);

impl FilesystemInfo for StaticFilesystems {
    fn mounted_filesystems(&self) -> Result<Vec<MountedFilesystem>> {
        Ok(self.0.clone())
    }
}
