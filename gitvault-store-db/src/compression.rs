// SPDX-License-Identifier: MIT

//! Compression dispatch and zstd dictionary management.
//!
//! Every stored row records the method it was written with, so databases
//! with mixed compression stay readable after the active method changes.
//! Zstd frames carry the id of the dictionary they were compressed with;
//! decompression resolves that id against the loaded dictionary set.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use gitvault_store_core::{Compression, ObjectKind};

use crate::connection::RepoDb;
use crate::error::{Error, Result};

/// Named-file slot for the trained commit dictionary.
pub const DICT_SLOT_COMMIT: &str = "_zstd_dict_commit";
/// Named-file slot for the trained tree dictionary.
pub const DICT_SLOT_TREE: &str = "_zstd_dict_tree";
/// Named-file slot for the trained chunk dictionary.
pub const DICT_SLOT_CHUNK: &str = "_zstd_dict_chunk";
/// Single-dictionary slot written by older engines; honored for reads only.
pub const DICT_SLOT_LEGACY: &str = "_zstd_dict";

/// Minimum sample count before a category gets a dictionary.
pub(crate) const DICT_SAMPLE_THRESHOLD: usize = 10;
/// Trained dictionary size cap.
pub(crate) const DICT_MAX_SIZE: usize = 16 * 1024;

const ZSTD_LEVEL: i32 = 3;

/// Payload categories that compress with their own trained dictionary.
/// Inline blobs and tags always compress without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DictSlot {
    Commit,
    Tree,
    Chunk,
}

impl DictSlot {
    pub(crate) const ALL: [DictSlot; 3] = [DictSlot::Commit, DictSlot::Tree, DictSlot::Chunk];

    pub(crate) fn named_file(&self) -> &'static str {
        match self {
            DictSlot::Commit => DICT_SLOT_COMMIT,
            DictSlot::Tree => DICT_SLOT_TREE,
            DictSlot::Chunk => DICT_SLOT_CHUNK,
        }
    }

    pub(crate) fn for_kind(kind: ObjectKind) -> Option<DictSlot> {
        match kind {
            ObjectKind::Commit => Some(DictSlot::Commit),
            ObjectKind::Tree => Some(DictSlot::Tree),
            ObjectKind::Blob | ObjectKind::Tag => None,
        }
    }
}

/// Loaded dictionaries: per-slot for compression, per-frame-id for
/// decompression (which also covers the legacy slot).
#[derive(Debug, Default, Clone)]
pub(crate) struct DictionarySet {
    slots: HashMap<DictSlot, Vec<u8>>,
    by_id: HashMap<u32, Vec<u8>>,
}

impl DictionarySet {
    /// Load dictionaries from their named-file slots.
    pub(crate) fn load(db: &RepoDb) -> Result<Self> {
        let mut set = DictionarySet::default();
        for slot in DictSlot::ALL {
            if let Some(dict) = db.named_file(slot.named_file())? {
                set.insert(slot, dict);
            }
        }
        if let Some(dict) = db.named_file(DICT_SLOT_LEGACY)? {
            set.register(dict);
        }
        Ok(set)
    }

    pub(crate) fn insert(&mut self, slot: DictSlot, dict: Vec<u8>) {
        self.register(dict.clone());
        self.slots.insert(slot, dict);
    }

    /// Make a dictionary available for frame-id lookup without binding it
    /// to a compression slot.
    fn register(&mut self, dict: Vec<u8>) {
        if let Some(id) = zstd::zstd_safe::get_dict_id_from_dict(&dict) {
            self.by_id.insert(id.get(), dict);
        }
    }

    fn for_slot(&self, slot: DictSlot) -> Option<&[u8]> {
        self.slots.get(&slot).map(Vec::as_slice)
    }

    fn by_frame_id(&self, id: u32) -> Option<&[u8]> {
        self.by_id.get(&id).map(Vec::as_slice)
    }
}

/// Compression engine for one repository handle: the active method for new
/// writes plus the loaded dictionary set (read-only after open).
#[derive(Debug, Clone)]
pub(crate) struct Codec {
    method: Compression,
    dicts: DictionarySet,
}

impl Codec {
    pub(crate) fn new(method: Compression, dicts: DictionarySet) -> Self {
        Codec { method, dicts }
    }

    /// Build the codec from persisted state: the `compression` metadata key
    /// and the dictionary named files.
    pub(crate) fn load(db: &RepoDb) -> Result<Self> {
        let method = match db.metadata("compression")? {
            Some(raw) => raw
                .parse()
                .map_err(|e: gitvault_store_core::UnknownCompression| {
                    Error::Compression(e.to_string())
                })?,
            None => Compression::None,
        };
        Ok(Codec {
            method,
            dicts: DictionarySet::load(db)?,
        })
    }

    pub(crate) fn method(&self) -> Compression {
        self.method
    }

    pub(crate) fn set_method(&mut self, method: Compression) {
        self.method = method;
    }

    /// Compress an inline object payload with the active method.
    pub(crate) fn compress_object(&self, kind: ObjectKind, raw: &[u8]) -> Result<Vec<u8>> {
        self.compress(raw, DictSlot::for_kind(kind))
    }

    /// Compress a chunk payload with the active method.
    pub(crate) fn compress_chunk(&self, raw: &[u8]) -> Result<Vec<u8>> {
        self.compress(raw, Some(DictSlot::Chunk))
    }

    fn compress(&self, raw: &[u8], slot: Option<DictSlot>) -> Result<Vec<u8>> {
        match self.method {
            Compression::None => Ok(raw.to_vec()),
            Compression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(raw).map_err(compression_error)?;
                encoder.finish().map_err(compression_error)
            }
            Compression::Zstd => match slot.and_then(|s| self.dicts.for_slot(s)) {
                Some(dict) => {
                    let mut compressor = zstd::bulk::Compressor::with_dictionary(ZSTD_LEVEL, dict)
                        .map_err(compression_error)?;
                    compressor.compress(raw).map_err(compression_error)
                }
                None => zstd::bulk::compress(raw, ZSTD_LEVEL).map_err(compression_error),
            },
        }
    }

    /// Decompress a stored payload according to the method recorded on its
    /// row. A zstd frame declaring dictionary id 0 decompresses plain; a
    /// nonzero id must match a loaded dictionary.
    pub(crate) fn decompress(&self, stored: &[u8], method: Compression) -> Result<Vec<u8>> {
        match method {
            Compression::None => Ok(stored.to_vec()),
            Compression::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(stored)
                    .read_to_end(&mut out)
                    .map_err(compression_error)?;
                Ok(out)
            }
            Compression::Zstd => match zstd::zstd_safe::get_dict_id_from_frame(stored) {
                None => zstd::stream::decode_all(stored).map_err(compression_error),
                Some(id) => {
                    let dict = self.dicts.by_frame_id(id.get()).ok_or_else(|| {
                        Error::Compression(format!(
                            "no dictionary loaded for frame dictionary id {id}"
                        ))
                    })?;
                    let mut decoder = zstd::stream::read::Decoder::with_dictionary(stored, dict)
                        .map_err(compression_error)?;
                    let mut out = Vec::new();
                    decoder.read_to_end(&mut out).map_err(compression_error)?;
                    Ok(out)
                }
            },
        }
    }
}

/// Train a dictionary from raw samples.
pub(crate) fn train_from_samples(samples: &[Vec<u8>]) -> Result<Vec<u8>> {
    zstd::dict::from_samples(samples, DICT_MAX_SIZE).map_err(compression_error)
}

fn compression_error(e: std::io::Error) -> Error {
    Error::Compression(e.to_string())
}
