//! Chunk arithmetic and reassembly: split a file into indexed chunks, collect
//! base64 payloads by index, decode and concatenate them in order.

use std::ops::Range;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Default chunk size in bytes. Operators change it at runtime.
pub const DEFAULT_CHUNK_SIZE: u64 = 256;

/// Most chunks one download may have. Sizes come from remote listings, so the slot
/// array must be bounded before it is allocated.
pub const MAX_CHUNKS: u64 = 1 << 24;

/// Largest chunk whose base64 form still fits in one protocol line.
pub const MAX_CHUNK_SIZE: u64 = (crate::wire::MAX_LINE_LEN as u64 - 4096) / 4 * 3;

fn effective(chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// Number of chunks for a file: `ceil(file_size / chunk_size)`. A zero chunk size means the default.
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(effective(chunk_size))
}

/// Byte range of chunk `index`, or `None` if the file has no such chunk.
/// Every chunk is `chunk_size` long except possibly the last.
pub fn chunk_range(index: u64, file_size: u64, chunk_size: u64) -> Option<Range<u64>> {
    let size = effective(chunk_size);
    let start = index.checked_mul(size)?;
    if start >= file_size {
        return None;
    }
    Some(start..(start.saturating_add(size)).min(file_size))
}

/// Base64 form of a chunk as carried in FILE messages.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Result slots for one download, indexed by chunk index.
/// Written by a single consumer; a later payload for the same index replaces the earlier one.
#[derive(Debug)]
pub struct ChunkSlots {
    slots: Vec<Option<String>>,
}

impl ChunkSlots {
    /// Callers bound `total_chunks` by [`MAX_CHUNKS`] first.
    pub fn new(total_chunks: u64) -> Self {
        Self {
            slots: vec![None; total_chunks as usize],
        }
    }

    /// Store a payload. Returns false (and stores nothing) when `index` is out of range.
    pub fn insert(&mut self, index: u64, payload: String) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(slot) => {
                *slot = Some(payload);
                true
            }
            None => false,
        }
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// First index without a payload.
    pub fn first_missing(&self) -> Option<u64> {
        self.slots.iter().position(Option::is_none).map(|i| i as u64)
    }

    /// Decode every slot and concatenate in index order.
    pub fn assemble(self) -> Result<Vec<u8>, AssemblyError> {
        let mut out = Vec::new();
        for (index, slot) in self.slots.into_iter().enumerate() {
            let index = index as u64;
            let payload = slot.ok_or(AssemblyError::MissingChunk { index })?;
            let bytes = STANDARD
                .decode(payload.as_bytes())
                .map_err(|source| AssemblyError::CorruptChunk { index, source })?;
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }
}

/// Reassembly failed; the offending chunk index is named.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("chunk {index} never arrived")]
    MissingChunk { index: u64 },
    #[error("chunk {index} is not valid base64: {source}")]
    CorruptChunk {
        index: u64,
        source: base64::DecodeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_chunks() {
        assert_eq!(total_chunks(1000, 300), 4);
        assert_eq!(total_chunks(900, 300), 3);
        assert_eq!(total_chunks(10, 100), 1);
        assert_eq!(total_chunks(0, 30), 0);
        assert_eq!(total_chunks(1, 1), 1);
    }

    #[test]
    fn count_matches_ceil_division() {
        for size in 1..200u64 {
            for chunk in 1..40u64 {
                let expected = (size as f64 / chunk as f64).ceil() as u64;
                assert_eq!(total_chunks(size, chunk), expected, "size {size} chunk {chunk}");
            }
        }
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        assert_eq!(total_chunks(DEFAULT_CHUNK_SIZE * 2, 0), 2);
    }

    #[test]
    fn largest_chunk_fits_one_line() {
        let encoded = MAX_CHUNK_SIZE.div_ceil(3) * 4;
        assert!(encoded + 1024 < crate::wire::MAX_LINE_LEN as u64);
        assert!(MAX_CHUNK_SIZE > DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn ranges_cover_file() {
        assert_eq!(chunk_range(0, 1000, 300), Some(0..300));
        assert_eq!(chunk_range(2, 1000, 300), Some(600..900));
        assert_eq!(chunk_range(3, 1000, 300), Some(900..1000));
        assert_eq!(chunk_range(4, 1000, 300), None);
        assert_eq!(chunk_range(0, 0, 300), None);
        assert_eq!(chunk_range(u64::MAX, 1000, 300), None);
    }

    #[test]
    fn assemble_in_index_order() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut slots = ChunkSlots::new(total_chunks(100, 30));
        // Arrival order differs from index order.
        for index in [3u64, 1, 0, 2] {
            let range = chunk_range(index, 100, 30).unwrap();
            let part = &data[range.start as usize..range.end as usize];
            assert!(slots.insert(index, encode_payload(part)));
        }
        assert_eq!(slots.first_missing(), None);
        assert_eq!(slots.assemble().unwrap(), data);
    }

    #[test]
    fn later_payload_overwrites() {
        let mut slots = ChunkSlots::new(1);
        slots.insert(0, encode_payload(b"old"));
        slots.insert(0, encode_payload(b"new"));
        assert_eq!(slots.assemble().unwrap(), b"new");
    }

    #[test]
    fn out_of_range_insert_rejected() {
        let mut slots = ChunkSlots::new(2);
        assert!(!slots.insert(2, encode_payload(b"x")));
        assert_eq!(slots.filled(), 0);
    }

    #[test]
    fn missing_chunk_named() {
        let mut slots = ChunkSlots::new(3);
        slots.insert(0, encode_payload(b"a"));
        slots.insert(2, encode_payload(b"c"));
        assert_eq!(slots.first_missing(), Some(1));
        assert!(matches!(
            slots.assemble(),
            Err(AssemblyError::MissingChunk { index: 1 })
        ));
    }

    #[test]
    fn corrupt_chunk_named() {
        let mut slots = ChunkSlots::new(2);
        slots.insert(0, encode_payload(b"a"));
        slots.insert(1, "***".to_string());
        assert!(matches!(
            slots.assemble(),
            Err(AssemblyError::CorruptChunk { index: 1, .. })
        ));
    }
}
