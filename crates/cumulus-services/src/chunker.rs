//! Chunker — splits a file's bytes into ordered, bounded chunks.
//!
//! Boundaries fall on exact multiples of the chunk size; only the last chunk
//! may be shorter. Block numbers come from a running counter, one per emitted
//! chunk, so block N always starts at byte N * chunk_size.

use bytes::Bytes;

use cumulus_core::wire::{validate_file_name, Chunk, WireError, MAX_CHUNK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize) -> Result<Self, WireError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(WireError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks `len` bytes split into. An empty file is one empty chunk.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size).max(1)
    }

    /// Split `data` into chunks for `file_name`.
    ///
    /// The returned iterator is finite and `Clone`; cloning it, or calling
    /// `split` again, restarts from block 0. Payloads are zero-copy slices of
    /// `data`.
    pub fn split(&self, file_name: &str, data: Bytes) -> Result<Chunks, WireError> {
        validate_file_name(file_name)?;
        Ok(Chunks {
            file_name: file_name.to_string(),
            data,
            chunk_size: self.chunk_size,
            pos: 0,
            next_block: 0,
            done: false,
        })
    }
}

/// Iterator over the chunks of one file.
#[derive(Debug, Clone)]
pub struct Chunks {
    file_name: String,
    data: Bytes,
    chunk_size: usize,
    pos: usize,
    next_block: u64,
    done: bool,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let end = (self.pos + self.chunk_size).min(self.data.len());
        let is_final = end == self.data.len();
        let data = self.data.slice(self.pos..end);

        let chunk = Chunk {
            file_name: self.file_name.clone(),
            block_number: self.next_block,
            declared_size: data.len() as u32,
            data,
            is_final,
        };

        self.pos = end;
        self.next_block += 1;
        self.done = is_final;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = (self.data.len() - self.pos).div_ceil(self.chunk_size).max(1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn bytes(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    #[test]
    fn rejects_zero_and_oversized_chunk_size() {
        assert!(Chunker::new(0).is_err());
        assert!(Chunker::new(MAX_CHUNK_SIZE + 1).is_err());
        assert!(Chunker::new(MAX_CHUNK_SIZE).is_ok());
    }

    #[test]
    fn ten_mib_at_four_mib_is_three_chunks() {
        let chunker = Chunker::new(4 * MIB).unwrap();
        let chunks: Vec<_> = chunker.split("report.txt", bytes(10 * MIB)).unwrap().collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.block_number).collect::<Vec<_>>(),
            [0, 1, 2]
        );
        assert_eq!(
            chunks.iter().map(|c| c.data.len()).collect::<Vec<_>>(),
            [4 * MIB, 4 * MIB, 2 * MIB]
        );
        assert_eq!(
            chunks.iter().map(|c| c.is_final).collect::<Vec<_>>(),
            [false, false, true]
        );
        assert!(chunks
            .iter()
            .all(|c| c.declared_size as usize == c.data.len()));
    }

    #[test]
    fn exact_multiple_has_full_final_chunk() {
        let chunker = Chunker::new(8).unwrap();
        let chunks: Vec<_> = chunker.split("a.bin", bytes(16)).unwrap().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].data.len(), 8);
        assert!(chunks[1].is_final);
    }

    #[test]
    fn empty_file_is_one_empty_final_chunk() {
        let chunker = Chunker::new(8).unwrap();
        let chunks: Vec<_> = chunker.split("empty", Bytes::new()).unwrap().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].block_number, 0);
        assert!(chunks[0].data.is_empty());
        assert!(chunks[0].is_final);
    }

    #[test]
    fn concatenated_chunks_reproduce_input() {
        let chunker = Chunker::new(7).unwrap();
        let data = bytes(100);
        let joined: Vec<u8> = chunker
            .split("f", data.clone())
            .unwrap()
            .flat_map(|c| c.data.to_vec())
            .collect();
        assert_eq!(joined, data.to_vec());
    }

    #[test]
    fn split_is_restartable() {
        let chunker = Chunker::new(3).unwrap();
        let chunks = chunker.split("f", bytes(10)).unwrap();
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn size_hint_matches_chunk_count() {
        let chunker = Chunker::new(3).unwrap();
        let mut chunks = chunker.split("f", bytes(10)).unwrap();
        assert_eq!(chunks.len(), chunker.chunk_count(10));
        chunks.next();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunker.chunk_count(0), 1);
    }

    #[test]
    fn invalid_name_is_rejected() {
        let chunker = Chunker::new(3).unwrap();
        assert!(chunker.split("../escape", bytes(1)).is_err());
    }
}
