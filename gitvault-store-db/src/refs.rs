// SPDX-License-Identifier: MIT

//! Reference store: compare-and-swap mutations, symbolic refs, the peeled
//! cache, and the reflog.
//!
//! Every mutation and its reflog append happen in one `BEGIN IMMEDIATE`
//! transaction, so the compare, the write and the history row are atomic
//! with respect to concurrent readers. A failed compare appends nothing.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use gitvault_store_core::{
    format_symbolic, is_valid_ref_name, symbolic_target, ObjectId, ReflogEntry, ReflogInfo,
    DEFAULT_COMMITTER, ZERO_REF,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::connection::RepoDb;
use crate::error::{Error, Result};

/// Symbolic-ref chains longer than this fail resolution.
const MAX_SYMREF_DEPTH: usize = 5;

/// Read/write access to the reference relations.
///
/// Borrowed from a [`Repository`](crate::Repository); valid only while the
/// handle is open.
pub struct RefStore<'repo> {
    pub(crate) db: &'repo RepoDb,
}

impl RefStore<'_> {
    /// Raw ref value: a 40-character hex id or a `ref: <name>` target.
    pub fn get(&self, name: &[u8]) -> Result<Vec<u8>> {
        read_ref(&self.db.conn, name)?.ok_or_else(|| Error::RefNotFound(lossy(name)))
    }

    /// Follow the symbolic chain from `name` to the terminal object id.
    pub fn resolve(&self, name: &[u8]) -> Result<ObjectId> {
        let mut current = name.to_vec();
        for _ in 0..=MAX_SYMREF_DEPTH {
            let value = self.get(&current)?;
            match symbolic_target(&value) {
                Some(target) => current = target.to_vec(),
                None => {
                    return ObjectId::from_hex(&value).map_err(|_| {
                        Error::Corrupt(format!(
                            "ref '{}' does not hold a hex object id",
                            lossy(&current)
                        ))
                    });
                }
            }
        }
        Err(Error::RefNotFound(lossy(name)))
    }

    /// All ref names.
    pub fn list_all(&self) -> Result<BTreeSet<Vec<u8>>> {
        let mut stmt = self.db.conn.prepare_cached("SELECT name FROM refs")?;
        let mut names = BTreeSet::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            names.insert(row.get(0)?);
        }
        Ok(names)
    }

    /// Atomic compare-and-swap.
    ///
    /// `old = None` sets unconditionally. `old` equal to the 40-zero hex id
    /// means the ref must not exist yet. Returns whether the swap happened.
    pub fn set_if_equals(
        &self,
        name: &[u8],
        old: Option<&[u8]>,
        new: &[u8],
        log: &ReflogInfo,
    ) -> Result<bool> {
        check_name(name)?;
        let tx = Transaction::new_unchecked(&self.db.conn, TransactionBehavior::Immediate)?;
        let swapped = match old {
            None => {
                let prev = read_ref(&tx, name)?;
                tx.execute(
                    "INSERT OR REPLACE INTO refs (name, value) VALUES (?1, ?2)",
                    params![name, new],
                )?;
                append_log(&tx, name, prev.as_deref(), Some(new), log)?;
                true
            }
            Some(expected) if expected == ZERO_REF.as_slice() => {
                if insert_if_absent(&tx, name, new)? {
                    append_log(&tx, name, None, Some(new), log)?;
                    true
                } else {
                    false
                }
            }
            Some(expected) => {
                let updated = tx.execute(
                    "UPDATE refs SET value = ?1 WHERE name = ?2 AND value = ?3",
                    params![new, name, expected],
                )?;
                if updated == 0 {
                    false
                } else {
                    append_log(&tx, name, Some(expected), Some(new), log)?;
                    true
                }
            }
        };
        if swapped {
            tx.commit()?;
        }
        Ok(swapped)
    }

    /// Create `name` iff it does not exist yet.
    pub fn add_if_new(&self, name: &[u8], value: &[u8], log: &ReflogInfo) -> Result<bool> {
        check_name(name)?;
        let tx = Transaction::new_unchecked(&self.db.conn, TransactionBehavior::Immediate)?;
        if !insert_if_absent(&tx, name, value)? {
            return Ok(false);
        }
        append_log(&tx, name, None, Some(value), log)?;
        tx.commit()?;
        Ok(true)
    }

    /// Atomic compare-and-delete. `old = None` deletes unconditionally;
    /// deleting a ref that never existed mutates nothing and logs nothing.
    pub fn remove_if_equals(
        &self,
        name: &[u8],
        old: Option<&[u8]>,
        log: &ReflogInfo,
    ) -> Result<bool> {
        let tx = Transaction::new_unchecked(&self.db.conn, TransactionBehavior::Immediate)?;
        let removed = match old {
            None => {
                let prev = read_ref(&tx, name)?;
                tx.execute("DELETE FROM refs WHERE name = ?1", params![name])?;
                if let Some(prev) = prev {
                    append_log(&tx, name, Some(&prev), None, log)?;
                }
                true
            }
            Some(expected) => {
                let deleted = tx.execute(
                    "DELETE FROM refs WHERE name = ?1 AND value = ?2",
                    params![name, expected],
                )?;
                if deleted == 0 {
                    false
                } else {
                    append_log(&tx, name, Some(expected), None, log)?;
                    true
                }
            }
        };
        if removed {
            tx.commit()?;
        }
        Ok(removed)
    }

    /// Point `name` at another ref by storing a `ref: <target>` value.
    pub fn set_symbolic(&self, name: &[u8], target: &[u8], log: &ReflogInfo) -> Result<()> {
        check_name(name)?;
        let value = format_symbolic(target);
        let tx = Transaction::new_unchecked(&self.db.conn, TransactionBehavior::Immediate)?;
        let prev = read_ref(&tx, name)?;
        tx.execute(
            "INSERT OR REPLACE INTO refs (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        append_log(&tx, name, prev.as_deref(), Some(&value), log)?;
        tx.commit()?;
        Ok(())
    }

    /// Cached fully-peeled object id for an annotated tag, if present.
    pub fn get_peeled(&self, name: &[u8]) -> Result<Option<ObjectId>> {
        let mut stmt = self
            .db
            .conn
            .prepare_cached("SELECT value FROM peeled_refs WHERE name = ?1")?;
        let value: Option<Vec<u8>> = stmt.query_row(params![name], |row| row.get(0)).optional()?;
        value
            .map(|v| {
                ObjectId::from_hex(&v).map_err(|_| {
                    Error::Corrupt(format!("peeled ref '{}' is not a hex object id", lossy(name)))
                })
            })
            .transpose()
    }

    /// Populate the peeled cache for `name`.
    pub fn put_peeled(&self, name: &[u8], id: ObjectId) -> Result<()> {
        self.db.conn.execute(
            "INSERT OR REPLACE INTO peeled_refs (name, value) VALUES (?1, ?2)",
            params![name, id.hex_bytes()],
        )?;
        Ok(())
    }

    /// Reference history for `name`, oldest first.
    pub fn reflog(&self, name: &[u8]) -> Result<Vec<ReflogEntry>> {
        let mut stmt = self.db.conn.prepare_cached(
            r#"
            SELECT id, ref_name, old_sha, new_sha, committer, timestamp, timezone, message
            FROM reflog
            WHERE ref_name = ?1
            ORDER BY id
            "#,
        )?;
        let mut entries = Vec::new();
        let mut rows = stmt.query(params![name])?;
        while let Some(row) = rows.next()? {
            entries.push(ReflogEntry {
                id: row.get(0)?,
                ref_name: row.get(1)?,
                old: row.get(2)?,
                new: row.get(3)?,
                committer: row.get(4)?,
                timestamp: row.get(5)?,
                timezone: row.get(6)?,
                message: row.get(7)?,
            });
        }
        Ok(entries)
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn check_name(name: &[u8]) -> Result<()> {
    if is_valid_ref_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidRefName(lossy(name)))
    }
}

fn read_ref(conn: &Connection, name: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut stmt = conn.prepare_cached("SELECT value FROM refs WHERE name = ?1")?;
    Ok(stmt.query_row(params![name], |row| row.get(0)).optional()?)
}

fn insert_if_absent(conn: &Connection, name: &[u8], value: &[u8]) -> Result<bool> {
    match conn.execute(
        "INSERT INTO refs (name, value) VALUES (?1, ?2)",
        params![name, value],
    ) {
        Ok(_) => Ok(true),
        Err(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn append_log(
    conn: &Connection,
    name: &[u8],
    old: Option<&[u8]>,
    new: Option<&[u8]>,
    info: &ReflogInfo,
) -> Result<()> {
    let committer = info.committer.as_deref().unwrap_or(DEFAULT_COMMITTER);
    let timestamp = info.timestamp.unwrap_or_else(now_unix);
    conn.execute(
        r#"
        INSERT INTO reflog (ref_name, old_sha, new_sha, committer, timestamp, timezone, message)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            name,
            old.unwrap_or(ZERO_REF.as_slice()),
            new.unwrap_or(ZERO_REF.as_slice()),
            committer,
            timestamp,
            info.timezone,
            info.message,
        ],
    )?;
    Ok(())
}

fn now_unix() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
