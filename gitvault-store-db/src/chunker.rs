// SPDX-License-Identifier: MIT

//! Content-defined chunking for blob deduplication.
//!
//! Only blobs are chunked. Text-like data is cut at line boundaries chosen
//! by a CRC32 mask, binary data by FastCDC. Both schemes are deterministic:
//! identical input always yields identical chunk boundaries.

use gitvault_store_core::ChunkId;

/// Blobs below this size are always stored inline.
pub(crate) const CHUNKING_THRESHOLD: usize = 4096;

/// Cut when crc32(line) & MASK == 0, giving ~8-line average chunks.
const TEXT_CDC_MASK: u32 = 0x7;
const TEXT_MIN_LINES: usize = 3;
const TEXT_MAX_CHUNK_BYTES: usize = 4096;

const BINARY_MIN_SIZE: u32 = 2048;
const BINARY_AVG_SIZE: u32 = 8192;
const BINARY_MAX_SIZE: u32 = 65536;

/// One chunk of a partitioned blob: its id over the raw bytes plus the raw
/// bytes themselves (borrowed from the input).
pub(crate) struct Chunk<'a> {
    pub(crate) id: ChunkId,
    pub(crate) data: &'a [u8],
}

/// Data looks like text when the first 8000 bytes contain no null byte.
pub(crate) fn is_text(data: &[u8]) -> bool {
    !data[..data.len().min(8000)].contains(&0)
}

/// Split text data into chunks at line boundaries using CRC32.
pub(crate) fn chunk_text(data: &[u8]) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut len = 0usize;
    let mut line_count = 0usize;

    for line in data.split_inclusive(|&b| b == b'\n') {
        len += line.len();
        line_count += 1;
        let crc = crc32fast::hash(line);

        let should_cut = (line_count >= TEXT_MIN_LINES && crc & TEXT_CDC_MASK == 0)
            || len >= TEXT_MAX_CHUNK_BYTES;

        if should_cut {
            let piece = &data[start..start + len];
            chunks.push(Chunk {
                id: ChunkId::digest(piece),
                data: piece,
            });
            start += len;
            len = 0;
            line_count = 0;
        }
    }

    // Flush the tail; empty input still yields one (empty) chunk.
    if len > 0 || chunks.is_empty() {
        let piece = &data[start..];
        chunks.push(Chunk {
            id: ChunkId::digest(piece),
            data: piece,
        });
    }

    chunks
}

/// Split binary data into chunks using FastCDC.
pub(crate) fn chunk_binary(data: &[u8]) -> Vec<Chunk<'_>> {
    fastcdc::v2020::FastCDC::new(data, BINARY_MIN_SIZE, BINARY_AVG_SIZE, BINARY_MAX_SIZE)
        .map(|entry| {
            let piece = &data[entry.offset..entry.offset + entry.length];
            Chunk {
                id: ChunkId::digest(piece),
                data: piece,
            }
        })
        .collect()
}

/// Chunk blob data for deduplication.
///
/// Returns `None` when the blob should be stored inline: it is below the
/// chunking threshold, or chunking yields at most one chunk.
pub(crate) fn chunk_blob(data: &[u8]) -> Option<Vec<Chunk<'_>>> {
    if data.len() < CHUNKING_THRESHOLD {
        return None;
    }

    let chunks = if is_text(data) {
        chunk_text(data)
    } else {
        chunk_binary(data)
    };

    if chunks.len() <= 1 {
        return None;
    }

    Some(chunks)
}

#[cfg(test)]
mod tests {
    use gitvault_store_core::ChunkId;
    use proptest::prelude::*;

    use super::*;

    /// Deterministic pseudo-random bytes (xorshift), enough entropy for CDC.
    fn random_bytes(size: usize, seed: u64) -> Vec<u8> {
        let mut state = seed.max(1);
        let mut out = Vec::with_capacity(size);
        while out.len() < size {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            out.extend_from_slice(&state.to_le_bytes());
        }
        out.truncate(size);
        out
    }

    fn reassemble(chunks: &[Chunk<'_>]) -> Vec<u8> {
        chunks.iter().flat_map(|c| c.data.iter().copied()).collect()
    }

    #[test]
    fn is_text_boundaries() {
        assert!(is_text(b"hello world\nline two\n"));
        assert!(!is_text(b"\x00\x01\x02\x03"));
        assert!(is_text(b""));
        // Null after the 8000-byte scan window is ignored.
        let mut late = vec![b'a'; 8000];
        late.push(0);
        assert!(is_text(&late));
        let mut early = vec![b'a'; 7999];
        early.push(0);
        assert!(!is_text(&early));
    }

    #[test]
    fn text_roundtrip() {
        let data: Vec<u8> = (0..500)
            .flat_map(|i| format!("line number {i} with content\n").into_bytes())
            .collect();
        let chunks = chunk_text(&data);
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), data);
    }

    #[test]
    fn text_chunk_ids_cover_raw_bytes() {
        let data = b"hello\nworld\nfoo\nbar\nbaz\n".repeat(20);
        for chunk in chunk_text(&data) {
            assert_eq!(chunk.id, ChunkId::digest(chunk.data));
        }
    }

    #[test]
    fn text_single_line() {
        let data = b"just one line\n";
        let chunks = chunk_text(data);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, data);
    }

    #[test]
    fn text_no_trailing_newline() {
        let data = b"line1\nline2\nline3";
        assert_eq!(reassemble(&chunk_text(data)), data);
    }

    #[test]
    fn text_empty_input_is_one_empty_chunk() {
        let chunks = chunk_text(b"");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
    }

    #[test]
    fn text_max_chunk_bytes_respected() {
        let data = [b"x".repeat(500).as_slice(), b"\n"].concat().repeat(50);
        let chunks = chunk_text(&data);
        for chunk in &chunks[..chunks.len() - 1] {
            // max plus one line of overshoot
            assert!(chunk.data.len() <= TEXT_MAX_CHUNK_BYTES + 501);
        }
    }

    #[test]
    fn binary_roundtrip_and_determinism() {
        let data = random_bytes(51200, 42);
        let chunks = chunk_binary(&data);
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), data);

        let again = chunk_binary(&data);
        let lens: Vec<usize> = chunks.iter().map(|c| c.data.len()).collect();
        let lens_again: Vec<usize> = again.iter().map(|c| c.data.len()).collect();
        assert_eq!(lens, lens_again);
    }

    #[test]
    fn binary_chunk_sizes_within_bounds() {
        let data = random_bytes(200_000, 7);
        let chunks = chunk_binary(&data);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.data.len() >= BINARY_MIN_SIZE as usize);
            assert!(chunk.data.len() <= BINARY_MAX_SIZE as usize);
        }
    }

    #[test]
    fn small_blob_stays_inline() {
        assert!(chunk_blob(&b"small".repeat(10)).is_none());
    }

    #[test]
    fn uniform_blob_above_threshold_stays_inline() {
        // A single run of 'x' never hits a text cut point.
        let data = vec![b'x'; CHUNKING_THRESHOLD + 100];
        assert!(chunk_blob(&data).is_none());
    }

    #[test]
    fn large_text_blob_chunks() {
        let data = b"line of text content\n".repeat(500);
        let chunks = chunk_blob(&data).expect("should chunk");
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), data);
    }

    #[test]
    fn large_binary_blob_chunks() {
        let mut data = vec![0u8];
        data.extend_from_slice(&random_bytes(51200, 99));
        let chunks = chunk_blob(&data).expect("should chunk");
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), data);
    }

    proptest! {
        #[test]
        fn chunking_preserves_content(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
            if let Some(chunks) = chunk_blob(&data) {
                prop_assert_eq!(reassemble(&chunks), data);
            }
        }
    }
}
