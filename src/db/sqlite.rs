// src/db/sqlite.rs

//! SQLite implementation of the package database

use super::{DbTag, HeaderIterator, InstalledFile, PackageDatabase, schema};
use crate::db::depcache::DependencyCache;
use crate::error::{Error, Result};
use crate::package::files::split_path;
use crate::package::{FileState, PackageHeader};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Installed packages stored in SQLite
pub struct SqliteDatabase {
    conn: Connection,
    path: Option<PathBuf>,
    interrupt: Arc<AtomicBool>,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = super::init(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn,
            path: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Shared flag that stops every running lookup when raised
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Record an installed package; returns its database offset
    pub fn insert_package(&self, header: &PackageHeader) -> Result<u32> {
        let blob = serde_json::to_string(header)?;
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO packages (name, epoch, version, release, arch, os, color, header)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &header.name,
                header.epoch.map(|e| e as i64),
                &header.version,
                &header.release,
                &header.arch,
                &header.os,
                header.color,
                &blob,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut dep_stmt = tx.prepare(
                "INSERT INTO dependencies (package_id, tag, name, sense, evr)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for set in [
                &header.provides,
                &header.requires,
                &header.conflicts,
                &header.obsoletes,
            ] {
                for dep in set {
                    dep_stmt.execute(params![
                        id,
                        set.tag().as_str(),
                        &dep.name,
                        dep.sense.bits(),
                        &dep.evr
                    ])?;
                }
            }

            let mut file_stmt = tx.prepare(
                "INSERT INTO files (package_id, file_index, dirname, basename, state)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (index, file) in header.files.iter() {
                file_stmt.execute(params![
                    id,
                    index as i64,
                    header.files.dirname(index),
                    &file.basename,
                    file.state.as_str()
                ])?;
            }
        }

        tx.commit()?;

        let offset = to_offset(id)?;
        info!("Recorded {} at offset {}", header.nevra(), offset);
        Ok(offset)
    }

    /// Forget an installed package
    pub fn remove_package(&self, offset: u32) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM packages WHERE id = ?1", [offset])?;
        Ok(removed > 0)
    }

    /// Change the recorded state of one installed file
    pub fn set_file_state(&self, offset: u32, file_index: usize, state: FileState) -> Result<()> {
        let Some(header) = self.header(offset)? else {
            return Err(Error::LookupError(format!(
                "no package at offset {}",
                offset
            )));
        };
        let mut header = (*header).clone();
        let file = header.files.files.get_mut(file_index).ok_or_else(|| {
            Error::LookupError(format!(
                "package at offset {} has no file {}",
                offset, file_index
            ))
        })?;
        file.state = state;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE packages SET header = ?1 WHERE id = ?2",
            params![serde_json::to_string(&header)?, offset],
        )?;
        tx.execute(
            "UPDATE files SET state = ?1 WHERE package_id = ?2 AND file_index = ?3",
            params![state.as_str(), offset, file_index as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Every installed package
    pub fn all_packages(&self) -> Result<Vec<Arc<PackageHeader>>> {
        self.load_headers("SELECT id, header FROM packages ORDER BY id", params![])
    }

    fn load_headers<P: rusqlite::Params>(
        &self,
        sql: &str,
        args: P,
    ) -> Result<Vec<Arc<PackageHeader>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, blob)| decode_header(id, &blob).map(Arc::new))
            .collect()
    }
}

fn to_offset(id: i64) -> Result<u32> {
    u32::try_from(id)
        .map_err(|_| Error::InvariantViolation(format!("database offset {} out of range", id)))
}

fn decode_header(id: i64, blob: &str) -> Result<PackageHeader> {
    let mut header: PackageHeader = serde_json::from_str(blob)?;
    header.instance = Some(to_offset(id)?);
    Ok(header)
}

impl PackageDatabase for SqliteDatabase {
    fn iter(&self, tag: DbTag, key: &str) -> Result<HeaderIterator> {
        let rows = match tag {
            DbTag::Name => self.load_headers(
                "SELECT id, header FROM packages WHERE name = ?1 ORDER BY id",
                params![key],
            )?,
            DbTag::ProvideName
            | DbTag::RequireName
            | DbTag::ConflictName
            | DbTag::ObsoleteName => {
                let column = match tag {
                    DbTag::ProvideName => "provides",
                    DbTag::RequireName => "requires",
                    DbTag::ConflictName => "conflicts",
                    _ => "obsoletes",
                };
                self.load_headers(
                    "SELECT DISTINCT p.id, p.header FROM packages p
                     JOIN dependencies d ON d.package_id = p.id
                     WHERE d.tag = ?1 AND d.name = ?2
                     ORDER BY p.id",
                    params![column, key],
                )?
            }
            DbTag::BaseNames => {
                let (dirname, basename) = split_path(key);
                self.load_headers(
                    "SELECT DISTINCT p.id, p.header FROM packages p
                     JOIN files f ON f.package_id = p.id
                     WHERE f.basename = ?1 AND f.dirname = ?2
                     ORDER BY p.id",
                    params![basename, dirname],
                )?
            }
        };

        debug!("{} lookup '{}': {} headers", tag, key, rows.len());
        Ok(HeaderIterator::new(rows, Some(self.interrupt_flag())))
    }

    fn header(&self, offset: u32) -> Result<Option<Arc<PackageHeader>>> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT header FROM packages WHERE id = ?1",
                [offset],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|b| decode_header(offset as i64, &b).map(Arc::new))
            .transpose()
    }

    fn files_by_basename(&self, basename: &str) -> Result<Vec<InstalledFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT package_id, file_index, dirname, basename FROM files
             WHERE basename = ?1 ORDER BY package_id, file_index",
        )?;
        let rows = stmt
            .query_map([basename], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, index, dirname, basename)| {
                Ok(InstalledFile {
                    db_offset: to_offset(id)?,
                    file_index: usize::try_from(index).map_err(|_| {
                        Error::InvariantViolation(format!("negative file index {}", index))
                    })?,
                    dirname,
                    basename,
                })
            })
            .collect()
    }

    fn dependency_cache(&self) -> Option<&dyn DependencyCache> {
        Some(self)
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::FileEntry;

    fn sample() -> PackageHeader {
        PackageHeader::builder("bash", "5.2-1")
            .provides("/bin/sh")
            .requires("glibc >= 2.34")
            .conflicts("zsh-compat")
            .obsoletes("bash-old")
            .file("/usr/bin/bash", FileEntry::regular(1000, "aa"))
            .file("/etc/bashrc", FileEntry::config(10, "bb"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_and_lookup_by_tags() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let offset = db.insert_package(&sample()).unwrap();

        let by_name: Vec<_> = db.iter(DbTag::Name, "bash").unwrap().collect();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].instance, Some(offset));
        assert_eq!(by_name[0].nevra(), "bash-5.2-1.x86_64");

        assert_eq!(db.iter(DbTag::ProvideName, "/bin/sh").unwrap().count(), 1);
        assert_eq!(db.iter(DbTag::ProvideName, "bash").unwrap().count(), 1);
        assert_eq!(db.iter(DbTag::RequireName, "glibc").unwrap().count(), 1);
        assert_eq!(db.iter(DbTag::ConflictName, "zsh-compat").unwrap().count(), 1);
        assert_eq!(db.iter(DbTag::ObsoleteName, "bash-old").unwrap().count(), 1);
        assert_eq!(db.iter(DbTag::BaseNames, "/etc/bashrc").unwrap().count(), 1);
        assert_eq!(db.iter(DbTag::BaseNames, "/etc/zshrc").unwrap().count(), 0);
        assert_eq!(db.iter(DbTag::RequireName, "bash").unwrap().count(), 0);
    }

    #[test]
    fn test_header_roundtrip_keeps_files() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let offset = db.insert_package(&sample()).unwrap();

        let header = db.header(offset).unwrap().unwrap();
        assert_eq!(header.files.len(), 2);
        assert_eq!(header.files.path(1), "/etc/bashrc");
        assert!(header.files.files[1].is_config());
        assert!(db.header(offset + 100).unwrap().is_none());
    }

    #[test]
    fn test_files_by_basename() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let offset = db.insert_package(&sample()).unwrap();

        let files = db.files_by_basename("bashrc").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].db_offset, offset);
        assert_eq!(files[0].file_index, 1);
        assert_eq!(files[0].dirname, "/etc/");
    }

    #[test]
    fn test_set_file_state_and_remove() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let offset = db.insert_package(&sample()).unwrap();

        db.set_file_state(offset, 0, FileState::Replaced).unwrap();
        let header = db.header(offset).unwrap().unwrap();
        assert_eq!(header.files.files[0].state, FileState::Replaced);
        assert!(db.set_file_state(offset, 9, FileState::Normal).is_err());

        assert!(db.remove_package(offset).unwrap());
        assert!(db.iter(DbTag::Name, "bash").unwrap().next().is_none());
        assert!(db.files_by_basename("bashrc").unwrap().is_empty());
    }

    #[test]
    fn test_interrupt_stops_iteration() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.insert_package(&sample()).unwrap();

        db.interrupt_flag().store(true, Ordering::Relaxed);
        assert!(db.is_interrupted());
        assert_eq!(db.iter(DbTag::Name, "bash").unwrap().count(), 0);
    }

    #[test]
    fn test_file_backed_database_has_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("packages.db");
        let db = SqliteDatabase::open(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(db.all_packages().unwrap().is_empty());
    }
}
