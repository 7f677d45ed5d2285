// SPDX-License-Identifier: MIT

//! Database connection management.

use std::path::Path;

use gitvault_store_core::Compression;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::{SCHEMA_SQL, SCHEMA_VERSION};

/// SQLite connection for one repository database.
///
/// Owned by the [`Repository`](crate::Repository) handle; the store views
/// borrow it. One handle, one connection, one thread at a time.
pub(crate) struct RepoDb {
    pub(crate) conn: Connection,
}

impl RepoDb {
    /// Open an existing database file read-write.
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotARepository(path.to_owned()));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE).map_err(
            |e| Error::DatabaseOpen {
                path: path.to_owned(),
                source: e,
            },
        )?;
        let db = Self { conn };
        db.configure_pragmas()?;

        debug!("Opened database at {}", path.display());
        Ok(db)
    }

    /// Open or create a database file read-write.
    pub(crate) fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| Error::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        let db = Self { conn };
        db.configure_pragmas()?;

        debug!("Created database at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub(crate) fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.configure_pragmas()?;
        debug!("Created in-memory database");
        Ok(db)
    }

    /// Pragmas applied to every connection.
    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    /// Create the schema at the current version and record engine metadata.
    pub(crate) fn create_schema(&self, compression: Compression) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('compression', ?1)",
            [compression.as_str()],
        )?;
        debug!("Created database schema at version {SCHEMA_VERSION}");
        Ok(())
    }

    /// Check whether this database carries an engine schema at all.
    pub(crate) fn has_metadata_table(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub(crate) fn metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub(crate) fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }

    pub(crate) fn named_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let contents = self
            .conn
            .query_row(
                "SELECT contents FROM named_files WHERE path = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(contents)
    }

    pub(crate) fn put_named_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO named_files (path, contents) VALUES (?1, ?2)",
            params![path, contents],
        )?;
        Ok(())
    }

    pub(crate) fn del_named_file(&self, path: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM named_files WHERE path = ?1", [path])?;
        Ok(rows > 0)
    }

    pub(crate) fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::from(e))
    }
}
