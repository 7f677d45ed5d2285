// SPDX-License-Identifier: MIT

//! Repository lifecycle and engine-level operations.

use std::collections::HashSet;
use std::path::Path;

use gitvault_store_core::{Compression, ObjectKind};
use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use crate::compression::{self, Codec, DictSlot, DictionarySet};
use crate::connection::RepoDb;
use crate::error::{Error, Result};
use crate::migrate;
use crate::objects::{ObjectStore, ROWID_BATCH};
use crate::refs::RefStore;
use crate::schema::FTS_SCHEMA_SQL;
use crate::search;
use crate::varint;

/// Reserved named-file path holding the repository configuration (opaque
/// bytes; the engine does not parse it).
pub const CONFIG_PATH: &str = "config";
/// Reserved named-file path holding the repository description.
pub const DESCRIPTION_PATH: &str = "description";
/// Reserved named-file path holding ignore patterns.
pub const EXCLUDE_PATH: &str = "info/exclude";

/// Row counts, mostly useful for tooling and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub object_count: u64,
    pub chunk_count: u64,
}

/// A bare repository stored in a single SQLite database file.
///
/// The handle exclusively owns the database connection for its lifetime;
/// [`ObjectStore`] and [`RefStore`] views borrow it.
pub struct Repository {
    db: RepoDb,
    codec: Codec,
}

impl Repository {
    /// Open an existing repository database. Runs pending schema
    /// migrations, then loads the active compression method and any trained
    /// dictionaries.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = match RepoDb::open(path.as_ref()) {
            Ok(db) => db,
            // The file exists but SQLite cannot read it as a database.
            Err(Error::Sqlite(e))
                if e.sqlite_error_code() == Some(rusqlite::ErrorCode::NotADatabase) =>
            {
                return Err(Error::NotARepository(path.as_ref().to_owned()));
            }
            Err(e) => return Err(e),
        };
        match db.has_metadata_table() {
            Ok(true) => {}
            // Readable file without our schema, or not a database at all.
            Ok(false) | Err(Error::Sqlite(_)) => {
                return Err(Error::NotARepository(path.as_ref().to_owned()));
            }
            Err(e) => return Err(e),
        }
        migrate::upgrade(&db)?;
        let codec = Codec::load(&db)?;
        Ok(Repository { db, codec })
    }

    /// Create a new bare repository database at `path`.
    pub fn init_bare<P: AsRef<Path>>(path: P, compression: Compression) -> Result<Self> {
        let db = RepoDb::create(path.as_ref())?;
        db.create_schema(compression)?;
        let codec = Codec::load(&db)?;
        debug!("Initialized bare repository at {}", path.as_ref().display());
        Ok(Repository { db, codec })
    }

    /// Create an in-memory repository (for testing).
    pub fn init_memory(compression: Compression) -> Result<Self> {
        let db = RepoDb::open_memory()?;
        db.create_schema(compression)?;
        let codec = Codec::load(&db)?;
        Ok(Repository { db, codec })
    }

    /// Object store view.
    pub fn objects(&self) -> ObjectStore<'_> {
        ObjectStore {
            db: &self.db,
            codec: &self.codec,
        }
    }

    /// Reference store view.
    pub fn refs(&self) -> RefStore<'_> {
        RefStore { db: &self.db }
    }

    /// Always fails with [`Error::NoIndex`]: the engine is bare by design.
    pub fn open_index(&self) -> Result<()> {
        Err(Error::NoIndex)
    }

    /// Close the handle, flushing the connection.
    pub fn close(self) -> Result<()> {
        self.db.close()
    }

    pub fn named_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.db.named_file(path)
    }

    pub fn put_named_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.db.put_named_file(path, contents)
    }

    pub fn del_named_file(&self, path: &str) -> Result<bool> {
        self.db.del_named_file(path)
    }

    /// Repository configuration as opaque bytes.
    pub fn config(&self) -> Result<Option<Vec<u8>>> {
        self.named_file(CONFIG_PATH)
    }

    pub fn set_config(&self, contents: &[u8]) -> Result<()> {
        self.put_named_file(CONFIG_PATH, contents)
    }

    pub fn description(&self) -> Result<Option<Vec<u8>>> {
        self.named_file(DESCRIPTION_PATH)
    }

    pub fn set_description(&self, contents: &[u8]) -> Result<()> {
        self.put_named_file(DESCRIPTION_PATH, contents)
    }

    /// The compression method applied to new writes.
    pub fn compression(&self) -> Compression {
        self.codec.method()
    }

    /// Select the compression method for subsequent writes. Existing rows
    /// keep their recorded method and stay readable.
    pub fn enable_compression(&mut self, method: Compression) -> Result<()> {
        self.db.set_metadata("compression", method.as_str())?;
        self.codec.set_method(method);
        debug!("Compression method set to {method}");
        Ok(())
    }

    pub fn disable_compression(&mut self) -> Result<()> {
        self.enable_compression(Compression::None)
    }

    /// Train per-category zstd dictionaries from the stored corpus, store
    /// them under their named-file slots, drop the legacy single-dictionary
    /// slot, and re-compress existing zstd rows with the fresh
    /// dictionaries. Categories with fewer than the minimum sample count
    /// get no dictionary.
    pub fn train_dictionary(&mut self) -> Result<()> {
        if self.codec.method() != Compression::Zstd {
            return Err(Error::Compression(
                "dictionary training requires zstd compression".into(),
            ));
        }

        let tx = self.db.conn.unchecked_transaction()?;
        let mut dicts = DictionarySet::default();
        for slot in DictSlot::ALL {
            let samples = self.collect_samples(&tx, slot)?;
            if samples.len() >= compression::DICT_SAMPLE_THRESHOLD {
                let dict = compression::train_from_samples(&samples)?;
                tx.execute(
                    "INSERT OR REPLACE INTO named_files (path, contents) VALUES (?1, ?2)",
                    params![slot.named_file(), &dict],
                )?;
                debug!(
                    "Trained {} from {} samples ({} bytes)",
                    slot.named_file(),
                    samples.len(),
                    dict.len()
                );
                dicts.insert(slot, dict);
            } else {
                tx.execute(
                    "DELETE FROM named_files WHERE path = ?1",
                    [slot.named_file()],
                )?;
            }
        }
        tx.execute(
            "DELETE FROM named_files WHERE path = ?1",
            [compression::DICT_SLOT_LEGACY],
        )?;

        let fresh = Codec::new(Compression::Zstd, dicts);
        self.recompress(&tx, &fresh)?;
        tx.commit()?;
        self.codec = fresh;
        Ok(())
    }

    fn collect_samples(&self, conn: &Connection, slot: DictSlot) -> Result<Vec<Vec<u8>>> {
        let mut samples = Vec::new();
        match slot {
            DictSlot::Commit | DictSlot::Tree => {
                let type_num = match slot {
                    DictSlot::Commit => ObjectKind::Commit.type_num(),
                    _ => ObjectKind::Tree.type_num(),
                };
                let mut stmt = conn.prepare(
                    "SELECT data, compression FROM objects WHERE type_num = ?1 AND data IS NOT NULL",
                )?;
                let mut rows = stmt.query([type_num])?;
                while let Some(row) = rows.next()? {
                    let data: Vec<u8> = row.get(0)?;
                    let method: String = row.get(1)?;
                    samples.push(self.codec.decompress(&data, parse_method(&method)?)?);
                }
            }
            DictSlot::Chunk => {
                let mut stmt = conn.prepare("SELECT data, compression FROM chunks")?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let data: Vec<u8> = row.get(0)?;
                    let method: String = row.get(1)?;
                    samples.push(self.codec.decompress(&data, parse_method(&method)?)?);
                }
            }
        }
        Ok(samples)
    }

    /// Rewrite every zstd-compressed row with `fresh`. Old frames are
    /// decoded with the currently loaded dictionaries before those are
    /// replaced.
    fn recompress(&self, conn: &Connection, fresh: &Codec) -> Result<()> {
        let inline: Vec<(Vec<u8>, i64, Vec<u8>)> = {
            let mut stmt = conn.prepare(
                "SELECT sha, type_num, data FROM objects WHERE data IS NOT NULL AND compression = 'zstd'",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        for (sha, type_num, data) in inline {
            let kind =
                ObjectKind::from_type_num(type_num).map_err(|e| Error::Corrupt(e.to_string()))?;
            let raw = self.codec.decompress(&data, Compression::Zstd)?;
            let recompressed = fresh.compress_object(kind, &raw)?;
            conn.execute(
                "UPDATE objects SET data = ?1 WHERE sha = ?2",
                params![recompressed, sha],
            )?;
        }

        let chunks: Vec<(i64, Vec<u8>)> = {
            let mut stmt =
                conn.prepare("SELECT rowid, data FROM chunks WHERE compression = 'zstd'")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        for (rowid, data) in chunks {
            let raw = self.codec.decompress(&data, Compression::Zstd)?;
            let recompressed = fresh.compress_chunk(&raw)?;
            conn.execute(
                "UPDATE chunks SET data = ?1 WHERE rowid = ?2",
                params![recompressed, rowid],
            )?;
        }
        Ok(())
    }

    /// Whether the FTS chunk index exists.
    pub fn has_fts(&self) -> Result<bool> {
        search::has_fts(&self.db.conn)
    }

    /// Create the FTS chunk index and backfill it from every existing text
    /// chunk (chunks whose raw bytes contain no null byte).
    pub fn enable_fts(&self) -> Result<()> {
        if self.has_fts()? {
            return Ok(());
        }
        let tx = self.db.conn.unchecked_transaction()?;
        tx.execute_batch(FTS_SCHEMA_SQL)?;

        let rows: Vec<(i64, Vec<u8>, String)> = {
            let mut stmt = tx.prepare("SELECT rowid, data, compression FROM chunks")?;
            let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            mapped.collect::<std::result::Result<_, _>>()?
        };
        let mut indexed = 0usize;
        for (rowid, data, method) in rows {
            let raw = self.codec.decompress(&data, parse_method(&method)?)?;
            if !raw.contains(&0) {
                tx.execute(
                    "INSERT INTO chunks_fts (rowid, content) VALUES (?1, ?2)",
                    params![rowid, String::from_utf8_lossy(&raw).into_owned()],
                )?;
                indexed += 1;
            }
        }
        tx.commit()?;
        debug!("Enabled FTS index over {indexed} text chunks");
        Ok(())
    }

    /// Drop the FTS chunk index. Search falls back to the substring passes.
    pub fn disable_fts(&self) -> Result<()> {
        self.db
            .conn
            .execute_batch("drop table if exists chunks_fts;")?;
        Ok(())
    }

    /// Delete chunk rows no longer referenced by any object and return how
    /// many were removed. Replaced objects can strand chunks; the engine
    /// never reclaims them implicitly.
    pub fn sweep_orphan_chunks(&self) -> Result<usize> {
        let tx = self.db.conn.unchecked_transaction()?;

        let mut referenced: HashSet<i64> = HashSet::new();
        {
            let mut stmt =
                tx.prepare("SELECT chunk_refs FROM objects WHERE chunk_refs IS NOT NULL")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let refs: Vec<u8> = row.get(0)?;
                referenced.extend(varint::unpack_refs(&refs)?);
            }
        }

        let all: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT rowid FROM chunks")?;
            let mapped = stmt.query_map([], |row| row.get(0))?;
            mapped.collect::<std::result::Result<_, _>>()?
        };
        let orphans: Vec<i64> = all
            .into_iter()
            .filter(|rowid| !referenced.contains(rowid))
            .collect();

        let fts = search::has_fts(&tx)?;
        for batch in orphans.chunks(ROWID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            tx.execute(
                &format!("DELETE FROM chunks WHERE rowid IN ({placeholders})"),
                params_from_iter(batch.iter()),
            )?;
            if fts {
                tx.execute(
                    &format!("DELETE FROM chunks_fts WHERE rowid IN ({placeholders})"),
                    params_from_iter(batch.iter()),
                )?;
            }
        }
        tx.commit()?;
        debug!("Swept {} orphan chunks", orphans.len());
        Ok(orphans.len())
    }

    /// Row counts for tooling and tests.
    pub fn stats(&self) -> Result<StoreStats> {
        let object_count: i64 =
            self.db
                .conn
                .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        let chunk_count: i64 =
            self.db
                .conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(StoreStats {
            object_count: object_count as u64,
            chunk_count: chunk_count as u64,
        })
    }
}

fn parse_method(method: &str) -> Result<Compression> {
    method
        .parse()
        .map_err(|e: gitvault_store_core::UnknownCompression| Error::Corrupt(e.to_string()))
}
