// SPDX-License-Identifier: MIT

//! Compression tests: zlib and zstd roundtrips, mixed-method databases,
//! dictionary training and re-compression.

use std::collections::BTreeSet;

use gitvault_store_core::{Compression, ObjectId, ObjectKind, RawObject};
use gitvault_store_db::{
    Error, Repository, DICT_SLOT_CHUNK, DICT_SLOT_COMMIT, DICT_SLOT_LEGACY, DICT_SLOT_TREE,
};
use rusqlite::Connection;

fn large_text(keyword: &str, lines: usize) -> Vec<u8> {
    (0..lines)
        .flat_map(|i| format!("{keyword} line {i} of the file\n").into_bytes())
        .collect()
}

fn commit_payload(i: usize) -> Vec<u8> {
    let mut payload = format!(
        "tree aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n\
         author Someone <someone@example.com> {} +0000\n\
         committer Someone <someone@example.com> {} +0000\n\n\
         commit number {i}\n\n",
        1_700_000_000 + i,
        1_700_000_000 + i
    )
    .into_bytes();
    for line in 0..12 {
        payload.extend_from_slice(
            format!("- change {line} of commit {i}: touched module_{}.rs\n", line % 5).as_bytes(),
        );
    }
    payload
}

fn tree_payload(i: usize) -> Vec<u8> {
    let mut payload = Vec::new();
    for entry in 0..16 {
        payload.extend_from_slice(
            format!("100644 file_{i}_{entry}.txt\x00aaaaaaaaaaaaaaaaaaaa").as_bytes(),
        );
    }
    payload
}

/// Populate a repository with enough commits, trees and chunked blobs for
/// dictionary training on every category.
fn populate(repo: &Repository) -> Vec<ObjectId> {
    let mut ids = Vec::new();
    let mut objects = Vec::new();
    for i in 0..30 {
        objects.push(RawObject::new(ObjectKind::Blob, large_text(&format!("sample_{i}"), 500)));
        objects.push(RawObject::new(ObjectKind::Commit, commit_payload(i)));
        objects.push(RawObject::new(ObjectKind::Tree, tree_payload(i)));
    }
    for obj in &objects {
        ids.push(obj.id());
    }
    repo.objects().add_objects(objects).unwrap();
    ids
}

#[test]
fn zlib_roundtrip_inline_and_chunked() {
    let repo = Repository::init_memory(Compression::Zlib).unwrap();

    let small = RawObject::new(ObjectKind::Blob, b"small content".to_vec());
    let large = RawObject::new(ObjectKind::Blob, large_text("roundtrip", 500));
    repo.objects().add_object(&small).unwrap();
    repo.objects().add_object(&large).unwrap();

    let (_, small_data) = repo.objects().get_raw(small.id()).unwrap();
    let (_, large_data) = repo.objects().get_raw(large.id()).unwrap();
    assert_eq!(small_data, small.data);
    assert_eq!(large_data, large.data);
}

#[test]
fn zstd_roundtrip_inline_and_chunked() {
    let repo = Repository::init_memory(Compression::Zstd).unwrap();

    let commit = RawObject::new(ObjectKind::Commit, commit_payload(1));
    let large = RawObject::new(ObjectKind::Blob, large_text("zstd_roundtrip", 500));
    repo.objects().add_object(&commit).unwrap();
    repo.objects().add_object(&large).unwrap();

    let (kind, commit_data) = repo.objects().get_raw(commit.id()).unwrap();
    assert_eq!(kind, ObjectKind::Commit);
    assert_eq!(commit_data, commit.data);
    let (_, large_data) = repo.objects().get_raw(large.id()).unwrap();
    assert_eq!(large_data, large.data);
}

#[test]
fn chunks_are_stored_compressed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zlib.db");
    let repo = Repository::init_bare(&path, Compression::Zlib).unwrap();
    let blob = RawObject::new(ObjectKind::Blob, large_text("compressed_check", 500));
    repo.objects().add_object(&blob).unwrap();
    repo.close().unwrap();

    let conn = Connection::open(&path).unwrap();
    let mut stmt = conn
        .prepare("SELECT data, compression, raw_size FROM chunks")
        .unwrap();
    let rows: Vec<(Vec<u8>, String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert!(!rows.is_empty());
    for (stored, method, raw_size) in rows {
        assert_eq!(method, "zlib");
        // Stored bytes are the compressed form, not the raw chunk.
        assert!((stored.len() as i64) < raw_size);
    }
}

#[test]
fn dedup_survives_compression_toggle() {
    let mut repo = Repository::init_memory(Compression::None).unwrap();
    let blob = RawObject::new(ObjectKind::Blob, large_text("dedup_test", 500));

    repo.objects().add_object(&blob).unwrap();
    let count_uncompressed = repo.stats().unwrap().chunk_count;

    repo.enable_compression(Compression::Zlib).unwrap();
    repo.objects().add_object(&blob).unwrap();

    // Chunk ids hash raw bytes, so the re-add finds every chunk already
    // present and inserts nothing.
    assert_eq!(repo.stats().unwrap().chunk_count, count_uncompressed);
}

#[test]
fn mixed_compression_methods_stay_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.db");
    let mut repo = Repository::init_bare(&path, Compression::None).unwrap();

    let blob1 = RawObject::new(ObjectKind::Blob, large_text("uncompressed_data", 500));
    repo.objects().add_object(&blob1).unwrap();

    repo.enable_compression(Compression::Zlib).unwrap();
    let blob2 = RawObject::new(ObjectKind::Blob, large_text("zlib_compressed", 500));
    repo.objects().add_object(&blob2).unwrap();

    repo.enable_compression(Compression::Zstd).unwrap();
    let blob3 = RawObject::new(ObjectKind::Blob, large_text("zstd_compressed", 500));
    repo.objects().add_object(&blob3).unwrap();

    for blob in [&blob1, &blob2, &blob3] {
        let (_, data) = repo.objects().get_raw(blob.id()).unwrap();
        assert_eq!(data, blob.data);
    }
    repo.close().unwrap();

    let conn = Connection::open(&path).unwrap();
    let mut stmt = conn.prepare("SELECT DISTINCT compression FROM chunks").unwrap();
    let methods: BTreeSet<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let expected: BTreeSet<String> = ["none", "zlib", "zstd"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(methods, expected);
}

#[test]
fn compression_method_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");
    let repo = Repository::init_bare(&path, Compression::Zstd).unwrap();
    assert_eq!(repo.compression(), Compression::Zstd);
    repo.close().unwrap();

    let repo = Repository::open(&path).unwrap();
    assert_eq!(repo.compression(), Compression::Zstd);
}

#[test]
fn train_dictionary_requires_zstd() {
    let mut repo = Repository::init_memory(Compression::Zlib).unwrap();
    assert!(matches!(
        repo.train_dictionary(),
        Err(Error::Compression(_))
    ));
}

#[test]
fn train_dictionary_writes_typed_slots_and_drops_legacy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.db");
    let mut repo = Repository::init_bare(&path, Compression::Zstd).unwrap();
    let ids = populate(&repo);

    // Plant a legacy single-dictionary slot; training must remove it.
    repo.put_named_file(DICT_SLOT_LEGACY, b"stale dictionary bytes").unwrap();

    repo.train_dictionary().unwrap();

    for slot in [DICT_SLOT_COMMIT, DICT_SLOT_TREE, DICT_SLOT_CHUNK] {
        assert!(
            repo.named_file(slot).unwrap().is_some(),
            "expected {slot} to exist"
        );
    }
    assert_eq!(repo.named_file(DICT_SLOT_LEGACY).unwrap(), None);

    // Everything written before training was re-compressed and still reads.
    for id in &ids {
        repo.objects().get_raw(*id).unwrap();
    }

    // New writes keep working with the trained dictionaries.
    let blob = RawObject::new(ObjectKind::Blob, large_text("after_training", 500));
    repo.objects().add_object(&blob).unwrap();
    let (_, data) = repo.objects().get_raw(blob.id()).unwrap();
    assert_eq!(data, blob.data);
}

#[test]
fn trained_dictionaries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reopen.db");
    let mut repo = Repository::init_bare(&path, Compression::Zstd).unwrap();
    let ids = populate(&repo);
    repo.train_dictionary().unwrap();
    repo.close().unwrap();

    // Dictionary-compressed frames need the dictionaries reloaded from
    // their named-file slots at open.
    let repo = Repository::open(&path).unwrap();
    for id in &ids {
        repo.objects().get_raw(*id).unwrap();
    }
}

#[test]
fn training_skips_sparse_categories() {
    let mut repo = Repository::init_memory(Compression::Zstd).unwrap();
    // Only chunked blobs, no commits or trees.
    let objects: Vec<RawObject> = (0..20)
        .map(|i| RawObject::new(ObjectKind::Blob, large_text(&format!("sparse_{i}"), 500)))
        .collect();
    repo.objects().add_objects(objects).unwrap();

    repo.train_dictionary().unwrap();

    assert!(repo.named_file(DICT_SLOT_CHUNK).unwrap().is_some());
    assert_eq!(repo.named_file(DICT_SLOT_COMMIT).unwrap(), None);
    assert_eq!(repo.named_file(DICT_SLOT_TREE).unwrap(), None);
}

#[test]
fn typed_dictionaries_stamp_frame_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frameid.db");
    let mut repo = Repository::init_bare(&path, Compression::Zstd).unwrap();
    populate(&repo);
    repo.train_dictionary().unwrap();

    let commit_dict = repo.named_file(DICT_SLOT_COMMIT).unwrap().unwrap();
    let commit_dict_id = zstd::zstd_safe::get_dict_id_from_dict(&commit_dict)
        .expect("trained dictionary carries an id");
    repo.close().unwrap();

    let conn = Connection::open(&path).unwrap();
    let mut stmt = conn
        .prepare("SELECT data FROM objects WHERE type_num = 1 AND compression = 'zstd'")
        .unwrap();
    let frames: Vec<Vec<u8>> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert!(!frames.is_empty());
    for frame in frames {
        assert_eq!(
            zstd::zstd_safe::get_dict_id_from_frame(&frame),
            Some(commit_dict_id)
        );
    }

    // Inline blobs compress without a dictionary: frame id 0.
    let mut stmt = conn
        .prepare("SELECT data FROM objects WHERE type_num = 3 AND data IS NOT NULL AND compression = 'zstd'")
        .unwrap();
    let frames: Vec<Vec<u8>> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    for frame in frames {
        assert_eq!(zstd::zstd_safe::get_dict_id_from_frame(&frame), None);
    }
}

#[test]
fn search_finds_compressed_content() {
    let repo = Repository::init_memory(Compression::Zstd).unwrap();
    let inline = RawObject::new(ObjectKind::Blob, b"unique_inline_keyword_here".to_vec());
    let chunked = RawObject::new(ObjectKind::Blob, large_text("searchable_keyword", 500));
    repo.objects().add_object(&inline).unwrap();
    repo.objects().add_object(&chunked).unwrap();

    let results = repo.objects().search_content(b"unique_inline_keyword_here").unwrap();
    assert!(results.contains(&inline.id()));

    let results = repo.objects().search_content(b"searchable_keyword").unwrap();
    assert!(results.contains(&chunked.id()));
}
