// SPDX-License-Identifier: MIT

//! Database schema definitions.
//!
//! Binary identifiers are stored as raw byte strings; the hex and text
//! columns are generated (read-only) projections for ad-hoc inspection.

/// Core schema SQL (objects, chunks, refs, peeled_refs, named_files,
/// metadata, reflog).
pub(crate) const SCHEMA_SQL: &str = r#"
create table if not exists objects (
    sha BLOB PRIMARY KEY NOT NULL,
    type_num INTEGER NOT NULL,
    data BLOB,
    chunk_refs BLOB,
    total_size INTEGER,
    compression TEXT NOT NULL DEFAULT 'none',
    sha_hex TEXT GENERATED ALWAYS AS (lower(hex(sha))) VIRTUAL,
    type_name TEXT GENERATED ALWAYS AS (
        CASE type_num
            WHEN 1 THEN 'commit'
            WHEN 2 THEN 'tree'
            WHEN 3 THEN 'blob'
            WHEN 4 THEN 'tag'
        END
    ) VIRTUAL,
    is_chunked INTEGER GENERATED ALWAYS AS (data IS NULL) VIRTUAL
);

create table if not exists chunks (
    chunk_sha BLOB PRIMARY KEY NOT NULL,
    data BLOB NOT NULL,
    compression TEXT NOT NULL DEFAULT 'none',
    raw_size INTEGER,
    chunk_sha_hex TEXT GENERATED ALWAYS AS (lower(hex(chunk_sha))) VIRTUAL,
    stored_size INTEGER GENERATED ALWAYS AS (length(data)) VIRTUAL
);

create table if not exists refs (
    name BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    name_text TEXT GENERATED ALWAYS AS (cast(name AS TEXT)) VIRTUAL,
    value_text TEXT GENERATED ALWAYS AS (cast(value AS TEXT)) VIRTUAL
);

create table if not exists peeled_refs (
    name BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    name_text TEXT GENERATED ALWAYS AS (cast(name AS TEXT)) VIRTUAL,
    value_text TEXT GENERATED ALWAYS AS (cast(value AS TEXT)) VIRTUAL
);

create table if not exists named_files (
    path TEXT PRIMARY KEY NOT NULL,
    contents BLOB NOT NULL
);

create table if not exists metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

create table if not exists reflog (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ref_name BLOB NOT NULL,
    old_sha BLOB NOT NULL,
    new_sha BLOB NOT NULL,
    committer BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    timezone INTEGER NOT NULL,
    message BLOB NOT NULL,
    ref_name_text TEXT GENERATED ALWAYS AS (cast(ref_name AS TEXT)) VIRTUAL,
    message_text TEXT GENERATED ALWAYS AS (cast(message AS TEXT)) VIRTUAL,
    datetime_text TEXT GENERATED ALWAYS AS (datetime(timestamp, 'unixepoch')) VIRTUAL
);

create index if not exists idx_reflog_ref on reflog (ref_name, id);
"#;

/// Optional full-text index over text chunk content.
pub(crate) const FTS_SCHEMA_SQL: &str = r#"
create virtual table if not exists chunks_fts using fts5(content);
"#;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;
