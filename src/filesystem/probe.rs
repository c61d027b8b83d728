// src/filesystem/probe.rs

//! Looking at what is currently on disk
//!
//! Config file fate depends on the file sitting below the install root:
//! whether it exists, its type, its digest and, for symlinks, its target.
//! Probes never follow a final symlink.

use super::path::under_root;
use crate::error::Result;
use crate::hash::{HashAlgorithm, digests_equal, hash_file};
use crate::package::{FileEntry, FileKind};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only view of files below an install root
#[derive(Debug, Clone)]
pub struct DiskProbe {
    root: PathBuf,
}

impl DiskProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a package path
    pub fn host_path(&self, path: &str) -> Result<PathBuf> {
        under_root(&self.root, path)
    }

    /// File type on disk, `None` if nothing is there
    pub fn kind(&self, path: &str) -> Result<Option<FileKind>> {
        let full = self.host_path(path)?;
        match std::fs::symlink_metadata(&full) {
            Ok(md) => Ok(Some(FileKind::from_mode(md.mode()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Digest of a regular file on disk
    ///
    /// Any read failure counts as "no usable file" and yields `None`.
    pub fn digest(&self, path: &str, algo: HashAlgorithm) -> Result<Option<String>> {
        let full = self.host_path(path)?;
        match hash_file(algo, &full) {
            Ok(digest) => Ok(Some(digest)),
            Err(e) => {
                debug!("cannot digest {}: {}", full.display(), e);
                Ok(None)
            }
        }
    }

    /// Target of a symlink on disk
    pub fn link_target(&self, path: &str) -> Result<Option<String>> {
        let full = self.host_path(path)?;
        match std::fs::read_link(&full) {
            Ok(target) => Ok(Some(target.to_string_lossy().into_owned())),
            Err(e) => {
                debug!("cannot readlink {}: {}", full.display(), e);
                Ok(None)
            }
        }
    }

    /// Does the file on disk differ from the packaged `entry`?
    ///
    /// Nothing on disk, a ghost entry or an unreadable file never differ.
    /// A different type always differs; regular files compare digests and
    /// symlinks compare targets.
    pub fn differs_from(&self, path: &str, entry: &FileEntry, algo: HashAlgorithm) -> Result<bool> {
        if entry.is_ghost() {
            return Ok(false);
        }
        let Some(kind) = self.kind(path)? else {
            return Ok(false);
        };
        if kind != entry.kind() {
            return Ok(true);
        }
        match kind {
            FileKind::Regular => Ok(match (self.digest(path, algo)?, &entry.digest) {
                (Some(on_disk), Some(packaged)) => !digests_equal(&on_disk, packaged),
                (Some(_), None) => true,
                (None, _) => false,
            }),
            FileKind::Symlink => Ok(match self.link_target(path)? {
                Some(target) => entry.link_to.as_deref() != Some(target.as_str()),
                None => false,
            }),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use tempfile::TempDir;

    #[test]
    fn test_probe_kinds() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("etc")).unwrap();
        std::fs::write(tmp.path().join("etc/a.conf"), b"a=1\n").unwrap();
        std::os::unix::fs::symlink("a.conf", tmp.path().join("etc/link")).unwrap();

        let probe = DiskProbe::new(tmp.path());
        assert_eq!(probe.kind("/etc").unwrap(), Some(FileKind::Directory));
        assert_eq!(probe.kind("/etc/a.conf").unwrap(), Some(FileKind::Regular));
        assert_eq!(probe.kind("/etc/link").unwrap(), Some(FileKind::Symlink));
        assert_eq!(probe.kind("/etc/none").unwrap(), None);
        assert!(probe.kind("/../escape").is_err());
    }

    #[test]
    fn test_probe_digest_and_link() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f"), b"data").unwrap();
        std::os::unix::fs::symlink("f", tmp.path().join("l")).unwrap();

        let probe = DiskProbe::new(tmp.path());
        assert_eq!(
            probe.digest("/f", HashAlgorithm::Sha256).unwrap(),
            Some(hash_bytes(HashAlgorithm::Sha256, b"data"))
        );
        assert_eq!(probe.digest("/missing", HashAlgorithm::Sha256).unwrap(), None);
        assert_eq!(probe.link_target("/l").unwrap().as_deref(), Some("f"));
        assert_eq!(probe.link_target("/f").unwrap(), None);
    }

    #[test]
    fn test_differs_from_packaged_entry() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f"), b"data").unwrap();
        std::os::unix::fs::symlink("f", tmp.path().join("l")).unwrap();
        let probe = DiskProbe::new(tmp.path());
        let sha = |b: &[u8]| hash_bytes(HashAlgorithm::Sha256, b);
        let algo = HashAlgorithm::Sha256;

        assert!(!probe.differs_from("/f", &FileEntry::config(4, sha(b"data")), algo).unwrap());
        assert!(probe.differs_from("/f", &FileEntry::config(4, sha(b"other")), algo).unwrap());
        assert!(probe.differs_from("/f", &FileEntry::symlink("f"), algo).unwrap());
        assert!(!probe.differs_from("/l", &FileEntry::symlink("f"), algo).unwrap());
        assert!(probe.differs_from("/l", &FileEntry::symlink("g"), algo).unwrap());
        assert!(!probe.differs_from("/missing", &FileEntry::config(4, sha(b"x")), algo).unwrap());
    }
}
