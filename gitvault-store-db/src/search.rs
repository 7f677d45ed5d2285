// SPDX-License-Identifier: MIT

//! Content search across inline and chunked data.
//!
//! `search_content` is an exact byte-substring match built from four passes:
//! SQL `instr` over uncompressed inline blobs and chunks, host-side
//! decompression over the compressed remainder. Matching chunk rowids are
//! reverse-mapped to objects by scanning packed `chunk_refs` blobs — there
//! is no join table to consult.
//!
//! The optional FTS5 index accelerates token queries over text chunks; it
//! is a separate entry point because token matching cannot honor the
//! substring contract.

use std::collections::{BTreeSet, HashSet};

use gitvault_store_core::{Compression, ObjectId};
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::objects::ObjectStore;
use crate::varint;

pub(crate) fn has_fts(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'chunks_fts'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl ObjectStore<'_> {
    /// Ids of blobs whose raw content contains `query` as a byte substring.
    ///
    /// An empty query matches every blob. Matches that span a chunk
    /// boundary are invisible: every pass sees one chunk at a time.
    pub fn search_content(&self, query: &[u8]) -> Result<Vec<ObjectId>> {
        if query.is_empty() {
            let mut stmt = self
                .db
                .conn
                .prepare_cached("SELECT sha FROM objects WHERE type_num = 3")?;
            let mut ids = BTreeSet::new();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                ids.insert(id_from_row(row.get(0)?)?);
            }
            return Ok(ids.into_iter().collect());
        }

        let mut ids = self.matching_inline(query)?;
        let rowids = self.matching_chunk_rowids(query)?;
        if !rowids.is_empty() {
            ids.extend(self.objects_referencing(&rowids)?);
        }
        Ok(ids.into_iter().collect())
    }

    /// Token search over the FTS5 chunk index, unioned with inline-blob
    /// substring matches. Falls back to [`Self::search_content`] when the
    /// index is absent. `query` uses FTS5 MATCH syntax.
    pub fn search_fts(&self, query: &str, limit: Option<usize>) -> Result<Vec<ObjectId>> {
        if !has_fts(&self.db.conn)? {
            let mut results = self.search_content(query.as_bytes())?;
            if let Some(limit) = limit {
                results.truncate(limit);
            }
            return Ok(results);
        }

        let mut rowids = HashSet::new();
        {
            let mut stmt = self
                .db
                .conn
                .prepare_cached("SELECT rowid FROM chunks_fts WHERE chunks_fts MATCH ?1")?;
            let mut rows = stmt.query(params![query])?;
            while let Some(row) = rows.next()? {
                rowids.insert(row.get::<_, i64>(0)?);
            }
        }

        let mut ids = self.matching_inline(query.as_bytes())?;
        if !rowids.is_empty() {
            ids.extend(self.objects_referencing(&rowids)?);
        }
        let mut results: Vec<ObjectId> = ids.into_iter().collect();
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    /// Passes 1 and 2: inline blob rows, uncompressed via SQL then
    /// compressed via host-side decompression.
    fn matching_inline(&self, query: &[u8]) -> Result<BTreeSet<ObjectId>> {
        let mut ids = BTreeSet::new();

        let mut stmt = self.db.conn.prepare_cached(
            r#"
            SELECT sha FROM objects
            WHERE type_num = 3 AND data IS NOT NULL AND compression = 'none'
              AND instr(data, ?1) > 0
            "#,
        )?;
        let mut rows = stmt.query(params![query])?;
        while let Some(row) = rows.next()? {
            ids.insert(id_from_row(row.get(0)?)?);
        }

        let mut stmt = self.db.conn.prepare_cached(
            r#"
            SELECT sha, data, compression FROM objects
            WHERE type_num = 3 AND data IS NOT NULL AND compression != 'none'
            "#,
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let sha: Vec<u8> = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            let method: String = row.get(2)?;
            let raw = self.codec.decompress(&data, parse_method(&method)?)?;
            if contains_bytes(&raw, query) {
                ids.insert(id_from_row(sha)?);
            }
        }

        Ok(ids)
    }

    /// Passes 3 and 4: chunk rows, uncompressed via SQL then compressed via
    /// host-side decompression. Returns matching chunk rowids.
    fn matching_chunk_rowids(&self, query: &[u8]) -> Result<HashSet<i64>> {
        let mut rowids = HashSet::new();

        let mut stmt = self.db.conn.prepare_cached(
            "SELECT rowid FROM chunks WHERE compression = 'none' AND instr(data, ?1) > 0",
        )?;
        let mut rows = stmt.query(params![query])?;
        while let Some(row) = rows.next()? {
            rowids.insert(row.get::<_, i64>(0)?);
        }

        let mut stmt = self
            .db
            .conn
            .prepare_cached("SELECT rowid, data, compression FROM chunks WHERE compression != 'none'")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let rowid: i64 = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            let method: String = row.get(2)?;
            let raw = self.codec.decompress(&data, parse_method(&method)?)?;
            if contains_bytes(&raw, query) {
                rowids.insert(rowid);
            }
        }

        Ok(rowids)
    }

    /// Reverse-map chunk rowids to the objects whose packed reference lists
    /// mention them, by scanning every chunked object row.
    fn objects_referencing(&self, rowids: &HashSet<i64>) -> Result<BTreeSet<ObjectId>> {
        let mut ids = BTreeSet::new();
        let mut stmt = self
            .db
            .conn
            .prepare_cached("SELECT sha, chunk_refs FROM objects WHERE chunk_refs IS NOT NULL")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let sha: Vec<u8> = row.get(0)?;
            let refs: Vec<u8> = row.get(1)?;
            if varint::unpack_refs(&refs)?
                .iter()
                .any(|rowid| rowids.contains(rowid))
            {
                ids.insert(id_from_row(sha)?);
            }
        }
        Ok(ids)
    }
}

fn id_from_row(sha: Vec<u8>) -> Result<ObjectId> {
    ObjectId::from_bytes(&sha).map_err(|e| Error::Corrupt(e.to_string()))
}

fn parse_method(method: &str) -> Result<Compression> {
    method
        .parse()
        .map_err(|e: gitvault_store_core::UnknownCompression| Error::Corrupt(e.to_string()))
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
