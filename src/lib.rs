// src/lib.rs

//! Conary transaction engine
//!
//! Given packages to install and erase, decides whether the transaction can
//! run and how: every dependency is checked against the transaction, the
//! installed database and the built-in capabilities, the packages are put
//! into a safe install order (dependency loops are broken where possible),
//! and every file gets an action with disk space accounted per filesystem.
//!
//! # Architecture
//!
//! - `TransactionSet` owns the elements and drives the stages
//! - `resolver` checks dependencies and orders elements
//! - `conflict` decides file actions and charges disk space
//! - `db` and `filesystem` are the seams to the installed database and the disk
//!
//! ```no_run
//! use conary_txn::{MountTable, PackageHeader, ResolverConfig, TransactionSet};
//!
//! # fn main() -> conary_txn::Result<()> {
//! let mut ts = TransactionSet::new(ResolverConfig::default(), None)?;
//! ts.add_install(PackageHeader::builder("hello", "1.0-1").build()?, false)?;
//! let report = ts.prepare(&MountTable::new())?;
//! for problem in &report.problems {
//!     eprintln!("{}", problem);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conflict;
pub mod db;
mod error;
pub mod filesystem;
pub mod hash;
pub mod package;
pub mod resolver;
pub mod transaction;
pub mod version;

pub use config::{ProblemFilter, ResolverConfig};
pub use conflict::{FileAction, FileActions};
pub use db::{DatabaseLock, PackageDatabase, SqliteDatabase};
pub use error::{Error, Result};
pub use filesystem::{
    DiskSpaceInfo, FilesystemInfo, Fingerprint, FingerprintCache, MountTable, MountedFilesystem,
    StaticFilesystems,
};
pub use hash::HashAlgorithm;
pub use package::{
    Dependency, DependencySet, FileEntry, FileFlags, FileSet, PackageHeader, Relocation, Sense,
};
pub use resolver::{OrderOutcome, ResolverContext};
pub use transaction::{
    AddedKey, AvailableIndex, ElementType, Problem, ProblemKind, ProblemSet, TransactionElement,
    TransactionReport, TransactionSet,
};
pub use version::RpmVersion;
