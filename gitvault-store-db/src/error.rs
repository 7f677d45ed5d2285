// SPDX-License-Identifier: MIT

//! Error types for storage engine operations.

use std::path::PathBuf;

use gitvault_store_core::ObjectId;
use thiserror::Error;

/// Result type for storage engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during storage engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The file exists but does not hold an engine database, or does not
    /// exist at all.
    #[error("not a gitvault repository: {0}")]
    NotARepository(PathBuf),

    /// The database reports a schema version this engine cannot handle.
    #[error("unsupported schema version '{found}' (newest supported is {supported})")]
    UnsupportedSchemaVersion { found: String, supported: i32 },

    /// Object lookup miss.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Ref lookup miss.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// Ref name failed validation.
    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    /// The database write lock could not be obtained within the busy
    /// timeout. Retryable by the caller.
    #[error("database is busy")]
    Busy,

    /// A packed chunk reference list failed to decode.
    #[error("corrupt chunk reference list: {0}")]
    CorruptReferenceList(String),

    /// The engine is always bare; there is no index.
    #[error("bare repository has no index")]
    NoIndex,

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Stored data violates an engine invariant.
    #[error("corrupt repository data: {0}")]
    Corrupt(String),

    /// Failed to open database with context
    #[error("failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Error::Busy,
            _ => Error::Sqlite(e),
        }
    }
}
