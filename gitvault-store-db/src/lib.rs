// SPDX-License-Identifier: MIT

//! SQLite storage engine for bare repositories.
//!
//! This crate stores an entire bare repository — objects, references,
//! reference history, configuration files and metadata — inside a single
//! SQLite database file.
//!
//! **Architecture**: the [`Repository`] handle owns one database connection
//! for its lifetime; [`ObjectStore`] and [`RefStore`] are non-owning views of
//! that connection. Blob payloads above a size threshold are partitioned by
//! content-defined chunking and deduplicated across versions; everything else
//! is stored inline on the object row, optionally compressed.
//!
//! # Key Features
//!
//! - Content-addressed object rows (20-byte SHA-1 keys) with an inline fast
//!   path and a chunked path for large blobs (32-byte SHA-256 chunk keys)
//! - Optional zlib or zstd compression, including trained per-category zstd
//!   dictionaries
//! - Atomic compare-and-swap ref mutations with an append-only reflog
//! - Versioned schema with forward migrations that preserve chunk rowids
//! - Byte-range reads of chunked objects without full reassembly
//! - Substring content search across inline and chunked, compressed and
//!   uncompressed data
//!
//! # Example
//!
//! ```ignore
//! use gitvault_store_core::{Compression, ObjectKind, RawObject};
//! use gitvault_store_db::Repository;
//!
//! let repo = Repository::init_bare("repo.db", Compression::Zstd)?;
//! let blob = RawObject::new(ObjectKind::Blob, b"hello world".to_vec());
//! repo.objects().add_object(&blob)?;
//! let (kind, data) = repo.objects().get_raw(blob.id())?;
//! ```

mod chunker;
mod compression;
mod connection;
mod error;
mod migrate;
mod objects;
mod refs;
mod repo;
mod schema;
mod search;
pub mod varint;

pub use compression::{DICT_SLOT_CHUNK, DICT_SLOT_COMMIT, DICT_SLOT_LEGACY, DICT_SLOT_TREE};
pub use error::{Error, Result};
pub use objects::ObjectStore;
pub use refs::RefStore;
pub use repo::{Repository, StoreStats, CONFIG_PATH, DESCRIPTION_PATH, EXCLUDE_PATH};
pub use schema::SCHEMA_VERSION;
