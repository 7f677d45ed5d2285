// SPDX-License-Identifier: MIT

//! Schema version detection and forward migrations.
//!
//! Migrations run sequentially, one transaction per version step, so an
//! interrupted upgrade leaves the file at the version it last completed.
//! Packed `chunk_refs` blobs address chunk rows by rowid, so any migration
//! that rebuilds the chunk relation must carry rowids across explicitly.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::connection::RepoDb;
use crate::error::{Error, Result};
use crate::schema::SCHEMA_VERSION;

pub(crate) fn upgrade(db: &RepoDb) -> Result<()> {
    let mut version = current_version(db)?;
    if !(1..=SCHEMA_VERSION).contains(&version) {
        return Err(Error::UnsupportedSchemaVersion {
            found: version.to_string(),
            supported: SCHEMA_VERSION,
        });
    }

    while version < SCHEMA_VERSION {
        let tx = db.conn.unchecked_transaction()?;
        match version {
            1 => migrate_chunk_ids_to_binary(&tx)?,
            2 => migrate_add_peeled_refs(&tx)?,
            _ => unreachable!("version range checked above"),
        }
        version += 1;
        tx.execute(
            "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
            [version.to_string()],
        )?;
        tx.commit()?;
        debug!("Migrated schema to version {version}");
    }
    Ok(())
}

fn current_version(db: &RepoDb) -> Result<i32> {
    let raw = db
        .metadata("schema_version")?
        .ok_or_else(|| Error::Corrupt("metadata has no schema_version".into()))?;
    raw.parse().map_err(|_| Error::UnsupportedSchemaVersion {
        found: raw.clone(),
        supported: SCHEMA_VERSION,
    })
}

/// v1 → v2: chunk ids change from lowercase-hex text to 32 raw bytes.
///
/// The rebuild inserts into a shadow table with the rowid copied verbatim,
/// then swaps it in, so every packed reference list stays valid.
fn migrate_chunk_ids_to_binary(tx: &Connection) -> Result<()> {
    tx.execute_batch(
        r#"
        create table chunks_migrate (
            chunk_sha BLOB PRIMARY KEY NOT NULL,
            data BLOB NOT NULL,
            compression TEXT NOT NULL DEFAULT 'none',
            raw_size INTEGER,
            chunk_sha_hex TEXT GENERATED ALWAYS AS (lower(hex(chunk_sha))) VIRTUAL,
            stored_size INTEGER GENERATED ALWAYS AS (length(data)) VIRTUAL
        );
        "#,
    )?;

    {
        let mut select =
            tx.prepare("SELECT rowid, chunk_sha, data, compression, raw_size FROM chunks")?;
        let mut insert = tx.prepare(
            r#"
            INSERT INTO chunks_migrate (rowid, chunk_sha, data, compression, raw_size)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let rowid: i64 = row.get(0)?;
            let hex_sha: String = row.get(1)?;
            let data: Vec<u8> = row.get(2)?;
            let compression: String = row.get(3)?;
            let raw_size: Option<i64> = row.get(4)?;
            let sha = hex::decode(&hex_sha)
                .map_err(|_| Error::Corrupt(format!("chunk id '{hex_sha}' is not valid hex")))?;
            insert.execute(params![rowid, sha, data, compression, raw_size])?;
        }
    }

    tx.execute_batch(
        r#"
        drop table chunks;
        alter table chunks_migrate rename to chunks;
        "#,
    )?;
    Ok(())
}

/// v2 → v3: peeled-ref cache and the reflog index.
fn migrate_add_peeled_refs(tx: &Connection) -> Result<()> {
    tx.execute_batch(
        r#"
        create table if not exists peeled_refs (
            name BLOB PRIMARY KEY NOT NULL,
            value BLOB NOT NULL,
            name_text TEXT GENERATED ALWAYS AS (cast(name AS TEXT)) VIRTUAL,
            value_text TEXT GENERATED ALWAYS AS (cast(value AS TEXT)) VIRTUAL
        );
        create index if not exists idx_reflog_ref on reflog (ref_name, id);
        "#,
    )?;
    Ok(())
}
