// SPDX-License-Identifier: MIT

//! Object store operations: writes, reads, iteration, byte-range reads.

use std::collections::HashMap;

use gitvault_store_core::{Compression, ObjectId, ObjectKind, RawObject};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::chunker;
use crate::compression::Codec;
use crate::connection::RepoDb;
use crate::error::{Error, Result};
use crate::search;
use crate::varint;

/// Rows fetched or deleted per `IN (...)` batch, comfortably under SQLite's
/// bound-parameter limit.
pub(crate) const ROWID_BATCH: usize = 500;

/// Read/write access to the object and chunk relations.
///
/// Borrowed from a [`Repository`](crate::Repository); valid only while the
/// handle is open.
pub struct ObjectStore<'repo> {
    pub(crate) db: &'repo RepoDb,
    pub(crate) codec: &'repo Codec,
}

struct ObjectRow {
    kind: ObjectKind,
    data: Option<Vec<u8>>,
    chunk_refs: Option<Vec<u8>>,
    total_size: i64,
    compression: Compression,
}

struct ChunkRow {
    data: Vec<u8>,
    compression: Compression,
}

impl ObjectStore<'_> {
    /// Insert or replace a single object and commit immediately.
    pub fn add_object(&self, obj: &RawObject) -> Result<()> {
        let tx = self.db.conn.unchecked_transaction()?;
        self.insert_object(&tx, obj)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace many objects atomically in one transaction.
    ///
    /// Pack ingestion feeds pre-inflated objects through this path: the
    /// whole batch becomes visible at once or not at all.
    pub fn add_objects<I>(&self, objects: I) -> Result<()>
    where
        I: IntoIterator<Item = RawObject>,
    {
        let tx = self.db.conn.unchecked_transaction()?;
        for obj in objects {
            self.insert_object(&tx, &obj)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_object(&self, conn: &Connection, obj: &RawObject) -> Result<()> {
        let id = obj.id();
        if obj.kind == ObjectKind::Blob {
            if let Some(chunks) = chunker::chunk_blob(&obj.data) {
                return self.insert_chunked(conn, &id, &chunks);
            }
        }

        let compressed = self.codec.compress_object(obj.kind, &obj.data)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO objects (sha, type_num, data, chunk_refs, total_size, compression)
            VALUES (?1, ?2, ?3, NULL, ?4, ?5)
            "#,
            params![
                id.as_bytes().as_slice(),
                obj.kind.type_num(),
                compressed,
                obj.data.len() as i64,
                self.codec.method().as_str(),
            ],
        )?;
        Ok(())
    }

    /// Write one chunk row per chunk (deduplicated by chunk id), then the
    /// object row holding the packed rowid list. The object row itself is
    /// uncompressed; chunks carry their own compression.
    fn insert_chunked(
        &self,
        conn: &Connection,
        id: &ObjectId,
        chunks: &[chunker::Chunk<'_>],
    ) -> Result<()> {
        let total_size: i64 = chunks.iter().map(|c| c.data.len() as i64).sum();
        let index_fts = search::has_fts(conn)?;
        let mut rowids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let compressed = self.codec.compress_chunk(chunk.data)?;
            let inserted = conn.execute(
                r#"
                INSERT OR IGNORE INTO chunks (chunk_sha, data, compression, raw_size)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    chunk.id.as_bytes().as_slice(),
                    compressed,
                    self.codec.method().as_str(),
                    chunk.data.len() as i64,
                ],
            )?;
            let rowid: i64 = if inserted > 0 {
                conn.last_insert_rowid()
            } else {
                conn.query_row(
                    "SELECT rowid FROM chunks WHERE chunk_sha = ?1",
                    [chunk.id.as_bytes().as_slice()],
                    |row| row.get(0),
                )?
            };
            if inserted > 0 && index_fts && !chunk.data.contains(&0) {
                conn.execute(
                    "INSERT INTO chunks_fts (rowid, content) VALUES (?1, ?2)",
                    params![rowid, String::from_utf8_lossy(chunk.data).into_owned()],
                )?;
            }
            rowids.push(rowid);
        }

        let packed = varint::pack_refs(&rowids);
        conn.execute(
            r#"
            INSERT OR REPLACE INTO objects (sha, type_num, data, chunk_refs, total_size, compression)
            VALUES (?1, ?2, NULL, ?3, ?4, 'none')
            "#,
            params![
                id.as_bytes().as_slice(),
                ObjectKind::Blob.type_num(),
                packed,
                total_size,
            ],
        )?;
        Ok(())
    }

    /// Existence test.
    pub fn contains(&self, id: ObjectId) -> Result<bool> {
        let mut stmt = self
            .db
            .conn
            .prepare_cached("SELECT 1 FROM objects WHERE sha = ?1 LIMIT 1")?;
        let found = stmt
            .query_row([id.as_bytes().as_slice()], |_| Ok(()))
            .optional()?
            .is_some();
        Ok(found)
    }

    /// Raw uncompressed size of an object.
    pub fn get_size(&self, id: ObjectId) -> Result<u64> {
        let mut stmt = self
            .db
            .conn
            .prepare_cached("SELECT total_size FROM objects WHERE sha = ?1")?;
        let size: Option<i64> = stmt
            .query_row([id.as_bytes().as_slice()], |row| row.get(0))
            .optional()?;
        match size {
            Some(n) => Ok(n.max(0) as u64),
            None => Err(Error::ObjectNotFound(id)),
        }
    }

    /// Fetch and fully reassemble an object.
    pub fn get_raw(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        let row = self.object_row(id)?;
        if let Some(data) = row.data {
            return Ok((row.kind, self.codec.decompress(&data, row.compression)?));
        }

        let refs = row
            .chunk_refs
            .ok_or_else(|| Error::Corrupt(format!("object {id} has no data and no chunk refs")))?;
        let rowids = varint::unpack_refs(&refs)?;
        let chunk_rows = self.fetch_chunk_rows(&rowids)?;

        let mut out = Vec::with_capacity(row.total_size.max(0) as usize);
        for rowid in &rowids {
            let chunk = chunk_rows
                .get(rowid)
                .ok_or_else(|| Error::Corrupt(format!("object {id} references missing chunk row {rowid}")))?;
            out.extend_from_slice(&self.codec.decompress(&chunk.data, chunk.compression)?);
        }
        Ok((row.kind, out))
    }

    /// Read `length` bytes starting at `offset` without reassembling the
    /// whole object. Out-of-range requests clamp: an offset at or past the
    /// end yields empty output, an overlong length is truncated.
    pub fn get_raw_range(
        &self,
        id: ObjectId,
        offset: u64,
        length: u64,
    ) -> Result<(ObjectKind, Vec<u8>)> {
        let row = self.object_row(id)?;
        let kind = row.kind;
        let total = row.total_size.max(0) as u64;
        if offset >= total || length == 0 {
            return Ok((kind, Vec::new()));
        }
        let end = total.min(offset.saturating_add(length));

        if let Some(data) = row.data {
            let raw = self.codec.decompress(&data, row.compression)?;
            let end = (end as usize).min(raw.len());
            let start = (offset as usize).min(end);
            return Ok((kind, raw[start..end].to_vec()));
        }

        let refs = row
            .chunk_refs
            .ok_or_else(|| Error::Corrupt(format!("object {id} has no data and no chunk refs")))?;
        let rowids = varint::unpack_refs(&refs)?;
        if rowids.is_empty() {
            return Err(Error::Corrupt(format!(
                "object {id} has an empty chunk reference list"
            )));
        }
        let sizes = self.fetch_chunk_sizes(&rowids)?;

        // Cumulative end offsets, in reference order.
        let mut ends = Vec::with_capacity(rowids.len());
        let mut cum = 0u64;
        for rowid in &rowids {
            let size = *sizes.get(rowid).ok_or_else(|| {
                Error::Corrupt(format!("object {id} references missing chunk row {rowid}"))
            })?;
            cum += size;
            ends.push(cum);
        }

        // First chunk whose end offset exceeds `offset`, last chunk whose
        // start offset lies before `end`.
        let first = ends.partition_point(|&e| e <= offset);
        let last = ends.partition_point(|&e| e < end).min(rowids.len() - 1);
        let needed = &rowids[first..=last];

        let chunk_rows = self.fetch_chunk_rows(needed)?;
        let mut assembled = Vec::with_capacity((end - offset) as usize + 1);
        for rowid in needed {
            let chunk = chunk_rows.get(rowid).ok_or_else(|| {
                Error::Corrupt(format!("object {id} references missing chunk row {rowid}"))
            })?;
            assembled.extend_from_slice(&self.codec.decompress(&chunk.data, chunk.compression)?);
        }

        let span_start = if first == 0 { 0 } else { ends[first - 1] };
        let rel_start = (offset - span_start) as usize;
        let rel_end = ((end - span_start) as usize).min(assembled.len());
        Ok((kind, assembled[rel_start.min(rel_end)..rel_end].to_vec()))
    }

    /// Ids of every stored object, order unspecified.
    pub fn iter_ids(&self) -> Result<impl Iterator<Item = ObjectId>> {
        let mut stmt = self.db.conn.prepare_cached("SELECT sha FROM objects")?;
        let mut ids = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let sha: Vec<u8> = row.get(0)?;
            ids.push(ObjectId::from_bytes(&sha).map_err(|e| Error::Corrupt(e.to_string()))?);
        }
        Ok(ids.into_iter())
    }

    fn object_row(&self, id: ObjectId) -> Result<ObjectRow> {
        let mut stmt = self.db.conn.prepare_cached(
            "SELECT type_num, data, chunk_refs, total_size, compression FROM objects WHERE sha = ?1",
        )?;
        let row = stmt
            .query_row([id.as_bytes().as_slice()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<Vec<u8>>>(1)?,
                    row.get::<_, Option<Vec<u8>>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .optional()?;
        let (type_num, data, chunk_refs, total_size, compression) =
            row.ok_or(Error::ObjectNotFound(id))?;
        Ok(ObjectRow {
            kind: ObjectKind::from_type_num(type_num)
                .map_err(|e| Error::Corrupt(e.to_string()))?,
            data,
            chunk_refs,
            total_size: total_size
                .ok_or_else(|| Error::Corrupt(format!("object {id} has no total_size")))?,
            compression: compression
                .parse()
                .map_err(|e: gitvault_store_core::UnknownCompression| Error::Corrupt(e.to_string()))?,
        })
    }

    fn fetch_chunk_rows(&self, rowids: &[i64]) -> Result<HashMap<i64, ChunkRow>> {
        let mut unique = rowids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut out = HashMap::with_capacity(unique.len());
        for batch in unique.chunks(ROWID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT rowid, data, compression FROM chunks WHERE rowid IN ({placeholders})"
            );
            let mut stmt = self.db.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(batch.iter()))?;
            while let Some(row) = rows.next()? {
                let rowid: i64 = row.get(0)?;
                let data: Vec<u8> = row.get(1)?;
                let compression: String = row.get(2)?;
                out.insert(
                    rowid,
                    ChunkRow {
                        data,
                        compression: compression.parse().map_err(
                            |e: gitvault_store_core::UnknownCompression| {
                                Error::Corrupt(e.to_string())
                            },
                        )?,
                    },
                );
            }
        }
        Ok(out)
    }

    fn fetch_chunk_sizes(&self, rowids: &[i64]) -> Result<HashMap<i64, u64>> {
        let mut unique = rowids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let mut out = HashMap::with_capacity(unique.len());
        for batch in unique.chunks(ROWID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql =
                format!("SELECT rowid, raw_size FROM chunks WHERE rowid IN ({placeholders})");
            let mut stmt = self.db.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(batch.iter()))?;
            while let Some(row) = rows.next()? {
                let rowid: i64 = row.get(0)?;
                let raw_size: Option<i64> = row.get(1)?;
                let raw_size = raw_size
                    .ok_or_else(|| Error::Corrupt(format!("chunk row {rowid} has no raw_size")))?;
                out.insert(rowid, raw_size.max(0) as u64);
            }
        }
        Ok(out)
    }
}
