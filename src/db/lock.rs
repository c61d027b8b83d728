// src/db/lock.rs

//! Exclusive lock on the package database
//!
//! Resolver runs read the database in several passes and assume nothing
//! changes in between. The lock lives next to the database file as
//! `.dblock` and is held with `flock(LOCK_EX)` until dropped.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the lock file inside the database directory
pub const LOCK_FILE_NAME: &str = ".dblock";

/// Whole-database exclusive lock
#[derive(Debug)]
pub struct DatabaseLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl DatabaseLock {
    /// Lock file path for a database file
    pub fn lock_path(db_path: &Path) -> PathBuf {
        db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join(LOCK_FILE_NAME)
    }

    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(path)?)
    }

    /// Lock the database at `db_path`, blocking until available
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = Self::lock_path(db_path);
        let file = Self::open(&path)?;

        file.lock_exclusive().map_err(|e| {
            Error::LockError(format!("Failed to lock {}: {}", path.display(), e))
        })?;

        info!("Acquired database lock at {}", path.display());
        Ok(Self { file, path })
    }

    /// Lock the database without blocking
    ///
    /// Returns `Ok(None)` if another process holds the lock.
    pub fn try_acquire(db_path: &Path) -> Result<Option<Self>> {
        let path = Self::lock_path(db_path);
        let file = Self::open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired database lock at {}", path.display());
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Database lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::LockError(format!(
                "Failed to try-lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        debug!("Releasing database lock at {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_next_to_db() {
        assert_eq!(
            DatabaseLock::lock_path(Path::new("/var/lib/conary/packages.db")),
            PathBuf::from("/var/lib/conary/.dblock")
        );
        assert_eq!(
            DatabaseLock::lock_path(Path::new("packages.db")),
            PathBuf::from("./.dblock")
        );
    }

    #[test]
    fn test_try_acquire_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("db/packages.db");

        let held = DatabaseLock::try_acquire(&db_path).unwrap();
        assert!(held.is_some());
        assert!(temp_dir.path().join("db/.dblock").exists());

        // flock locks are per open file description, so a second open fails
        let second = DatabaseLock::try_acquire(&db_path).unwrap();
        assert!(second.is_none());

        drop(held);
        let third = DatabaseLock::try_acquire(&db_path).unwrap();
        assert!(third.is_some());
    }
}
