//! Per-transfer reconstruction state.
//!
//! A [`ReconstructionTask`] exists only between an accepted header and the
//! transfer's terminal state. Chunks are stored by index, so the received
//! count is the map length and can never drift from the stored set.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use super::{AssemblyError, ReassemblyError};
use crate::{
    Digest,
    encoding,
    record::{ArtifactId, ChunkIndex, ChunkRecord, HeaderRecord, RecordKind},
};

/// Collection progress of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Distinct valid chunk indices stored.
    pub received: usize,
    /// Chunks declared by the header.
    pub total: u32,
}

impl ChunkProgress {
    /// Whether every declared chunk is present.
    #[must_use]
    pub fn is_complete(self) -> bool { u32::try_from(self.received).is_ok_and(|r| r == self.total) }
}

/// Chunks collected so far for one transfer.
#[derive(Debug)]
pub struct ReconstructionTask {
    id: ArtifactId,
    header: HeaderRecord,
    chunks: BTreeMap<ChunkIndex, String>,
    started_at: Instant,
}

impl ReconstructionTask {
    /// Start collecting for an accepted `header`.
    #[must_use]
    pub fn new(header: HeaderRecord, started_at: Instant) -> Self {
        Self {
            id: header.artifact_id(),
            header,
            chunks: BTreeMap::new(),
            started_at,
        }
    }

    /// Identifier of the transfer.
    #[must_use]
    pub fn id(&self) -> &ArtifactId { &self.id }

    /// Header the task was seeded from.
    #[must_use]
    pub fn header(&self) -> &HeaderRecord { &self.header }

    /// Time the header was accepted.
    #[must_use]
    pub fn started_at(&self) -> Instant { self.started_at }

    /// Time elapsed since the header was accepted.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration { now.saturating_duration_since(self.started_at) }

    /// Current collection progress.
    #[must_use]
    pub fn progress(&self) -> ChunkProgress {
        ChunkProgress {
            received: self.chunks.len(),
            total: self.header.total_chunks,
        }
    }

    /// Whether every declared chunk is present.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.progress().is_complete() }

    /// Indices not yet received, in ascending order.
    #[must_use]
    pub fn missing_indices(&self) -> Vec<ChunkIndex> {
        (0..self.header.total_chunks)
            .map(ChunkIndex::new)
            .filter(|index| !self.chunks.contains_key(index))
            .collect()
    }

    /// Inclusive bounds on the payload length of the chunk at `index`.
    ///
    /// Every chunk but the last fills `chunk_size` exactly. The last carries
    /// the remainder of the padded encoding, or up to two characters fewer
    /// when the sender strips `=` padding.
    fn payload_bounds(&self, index: ChunkIndex) -> (usize, usize) {
        let chunk_size = self.header.chunk_size;
        if index.get().saturating_add(1) < self.header.total_chunks {
            return (chunk_size, chunk_size);
        }
        let encoded =
            usize::try_from(self.header.artifact_size).map_or(usize::MAX, encoding::encoded_len);
        let preceding = usize::try_from(index.get())
            .unwrap_or(usize::MAX)
            .saturating_mul(chunk_size);
        let full = encoded.saturating_sub(preceding);
        (full.saturating_sub(2).max(1), full)
    }

    /// Validate and store `chunk`.
    ///
    /// Nothing is stored unless every check passes, so a rejected chunk
    /// leaves the task exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::TotalMismatch`],
    /// [`ReassemblyError::IndexOutOfRange`] or
    /// [`ReassemblyError::LastFlagMismatch`] when the chunk disagrees with the
    /// header, [`ReassemblyError::PayloadLength`] when the payload does not
    /// fit the declared geometry, [`ReassemblyError::DuplicateChunk`] when the index is already
    /// stored and [`ReassemblyError::ChunkDigestMismatch`] when the payload
    /// does not match its digest.
    pub fn accept(&mut self, chunk: ChunkRecord) -> Result<ChunkProgress, ReassemblyError> {
        let total = self.header.total_chunks;
        let index = chunk.chunk_index;

        if chunk.total_chunks != total {
            return Err(ReassemblyError::TotalMismatch {
                id: self.id.clone(),
                kind: RecordKind::Chunk,
                expected: total,
                found: chunk.total_chunks,
            });
        }
        if index.get() >= total {
            return Err(ReassemblyError::IndexOutOfRange {
                id: self.id.clone(),
                index,
                total,
            });
        }
        if chunk.is_last != (index.get() + 1 == total) {
            return Err(ReassemblyError::LastFlagMismatch {
                id: self.id.clone(),
                index,
            });
        }
        let (shortest, longest) = self.payload_bounds(index);
        let found = chunk.chunk_payload.len();
        if !(shortest..=longest).contains(&found) {
            return Err(ReassemblyError::PayloadLength {
                id: self.id.clone(),
                index,
                expected: longest,
                found,
            });
        }
        if self.chunks.contains_key(&index) {
            return Err(ReassemblyError::DuplicateChunk {
                id: self.id.clone(),
                index,
            });
        }
        if !chunk.verify() {
            return Err(ReassemblyError::ChunkDigestMismatch {
                id: self.id.clone(),
                index,
            });
        }

        self.chunks.insert(index, chunk.chunk_payload);
        Ok(self.progress())
    }

    /// Join, decode and verify the collected chunks.
    ///
    /// Callers only invoke this once [`is_complete`](Self::is_complete)
    /// holds.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::MissingChunk`] if an index is absent,
    /// [`AssemblyError::Decode`] if the joined text is not base64,
    /// [`AssemblyError::DigestMismatch`] if the bytes do not hash to the
    /// header's digest and [`AssemblyError::SizeMismatch`] if their length
    /// differs from the declared size.
    pub fn assemble(&self) -> Result<Vec<u8>, AssemblyError> {
        let encoded_len = self.chunks.values().map(String::len).sum();
        let mut encoded = String::with_capacity(encoded_len);
        for index in (0..self.header.total_chunks).map(ChunkIndex::new) {
            let Some(payload) = self.chunks.get(&index) else {
                return Err(AssemblyError::MissingChunk {
                    id: self.id.clone(),
                    index,
                });
            };
            encoded.push_str(payload);
        }

        let bytes = encoding::decode_lenient(&encoded).map_err(|source| AssemblyError::Decode {
            id: self.id.clone(),
            source,
        })?;

        if !self.header.artifact_digest.matches(&bytes) {
            return Err(AssemblyError::DigestMismatch {
                id: self.id.clone(),
                expected: self.header.artifact_digest.clone(),
                computed: Digest::of(&bytes),
            });
        }
        let actual = bytes.len() as u64;
        if actual != self.header.artifact_size {
            return Err(AssemblyError::SizeMismatch {
                id: self.id.clone(),
                expected: self.header.artifact_size,
                actual,
            });
        }
        Ok(bytes)
    }
}
