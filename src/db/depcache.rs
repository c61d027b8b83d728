// src/db/depcache.rs

//! Persistent dependency result cache
//!
//! Database scans for provides and file owners are the expensive part of a
//! dependency check, and the same dependency strings come up run after run.
//! Answers derived from the database are remembered under the formatted
//! dependency (`R glibc >= 2.34`). Entries are not invalidated when the
//! database changes; `clear()` or turning the cache off in the config are
//! the ways out.

use super::sqlite::SqliteDatabase;
use crate::error::Result;
use rusqlite::{OptionalExtension, params};

/// Key/value store for dependency answers
pub trait DependencyCache {
    /// Cached answer for a formatted dependency
    fn get(&self, key: &str) -> Result<Option<bool>>;

    /// Remember an answer
    fn put(&self, key: &str, satisfied: bool) -> Result<()>;

    /// Drop every entry
    fn clear(&self) -> Result<()>;
}

impl DependencyCache for SqliteDatabase {
    fn get(&self, key: &str) -> Result<Option<bool>> {
        let satisfied = self
            .connection()
            .query_row(
                "SELECT satisfied FROM depcache WHERE key = ?1",
                [key],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(satisfied)
    }

    fn put(&self, key: &str, satisfied: bool) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO depcache (key, satisfied) VALUES (?1, ?2)",
            params![key, satisfied],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.connection().execute("DELETE FROM depcache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_clear() {
        let db = SqliteDatabase::open_in_memory().unwrap();

        assert_eq!(db.get("R foo").unwrap(), None);
        db.put("R foo", true).unwrap();
        db.put("R bar >= 2", false).unwrap();
        assert_eq!(db.get("R foo").unwrap(), Some(true));
        assert_eq!(db.get("R bar >= 2").unwrap(), Some(false));

        db.put("R foo", false).unwrap();
        assert_eq!(db.get("R foo").unwrap(), Some(false));

        db.clear().unwrap();
        assert_eq!(db.get("R foo").unwrap(), None);
    }
}
