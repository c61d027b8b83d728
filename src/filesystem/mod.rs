// src/filesystem/mod.rs

//! Filesystem views used by the conflict resolver
//!
//! This module provides:
//! - Fingerprints: mount-aware identities for package paths
//! - Disk probes: type, digest and link target of files below the root
//! - Mount enumeration and per-filesystem disk space accounting

pub mod diskspace;
pub mod fingerprint;
pub mod mounts;
pub mod path;
pub mod probe;

pub use diskspace::{DiskSpaceInfo, DiskSpaceTable, Shortfall};
pub use fingerprint::{Fingerprint, FingerprintCache, FingerprintLookup, FingerprintMap};
pub use mounts::{FilesystemInfo, MountTable, MountedFilesystem, StaticFilesystems};
pub use probe::DiskProbe;
