//! Splits artifacts into header, chunk and completion records.
//!
//! [`Fragmenter`] base64-encodes an artifact, hashes the raw bytes and slices
//! the encoded text into fixed-size chunks, each carrying its own digest. The
//! result is a [`TransferBatch`] holding every record in emission order.

use std::num::NonZeroUsize;

use super::FragmentationError;
use crate::{
    Digest,
    encoding,
    record::{ArtifactId, ChunkIndex, ChunkRecord, CompletionRecord, HeaderRecord, Record},
};

/// Splits artifacts into chunk-sized records.
#[derive(Clone, Copy, Debug)]
pub struct Fragmenter {
    chunk_size: NonZeroUsize,
}

impl Fragmenter {
    /// Create a fragmenter emitting at most `chunk_size` encoded characters
    /// per chunk.
    #[must_use]
    pub const fn new(chunk_size: NonZeroUsize) -> Self { Self { chunk_size } }

    /// Return the configured chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> NonZeroUsize { self.chunk_size }

    /// Encode `artifact` and split it into records for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::EmptyArtifact`] for an empty artifact and
    /// [`FragmentationError::IndexOverflow`] if more than `u32::MAX` chunks
    /// would be required.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    ///
    /// use chunkwire::{
    ///     fragment::Fragmenter,
    ///     record::{ArtifactId, DeviceId, OriginTimestamp},
    /// };
    ///
    /// let fragmenter = Fragmenter::new(NonZeroUsize::new(4).unwrap());
    /// let id = ArtifactId::new(DeviceId::new("cam"), OriginTimestamp::from_millis(1));
    /// let batch = fragmenter.fragment(id, b"hello").unwrap();
    /// assert_eq!(batch.header().total_chunks, 2);
    /// assert!(batch.chunks()[1].is_last);
    /// ```
    pub fn fragment(
        &self,
        id: ArtifactId,
        artifact: impl AsRef<[u8]>,
    ) -> Result<TransferBatch, FragmentationError> {
        let artifact = artifact.as_ref();
        if artifact.is_empty() {
            return Err(FragmentationError::EmptyArtifact);
        }

        let artifact_digest = Digest::of(artifact);
        let encoded = encoding::encode(artifact);
        let chunk_count = encoded.len().div_ceil(self.chunk_size.get());
        let total_chunks = u32::try_from(chunk_count).map_err(|_| {
            FragmentationError::IndexOverflow {
                last: ChunkIndex::new(u32::MAX),
            }
        })?;

        let chunks = self.build_chunks(&id, &encoded, total_chunks)?;
        let header = HeaderRecord {
            device_id: id.device_id().clone(),
            origin_timestamp: id.origin_timestamp(),
            artifact_digest: artifact_digest.clone(),
            total_chunks,
            chunk_size: self.chunk_size.get(),
            artifact_size: artifact.len() as u64,
        };
        let completion = CompletionRecord {
            device_id: id.device_id().clone(),
            origin_timestamp: id.origin_timestamp(),
            artifact_digest,
            total_chunks,
        };

        Ok(TransferBatch {
            id,
            header,
            chunks,
            completion,
            encoded_len: encoded.len(),
        })
    }

    fn build_chunks(
        &self,
        id: &ArtifactId,
        encoded: &str,
        total_chunks: u32,
    ) -> Result<Vec<ChunkRecord>, FragmentationError> {
        let max = self.chunk_size.get();
        let total = encoded.len();
        let mut chunks = Vec::with_capacity(total.div_ceil(max));
        let mut index = ChunkIndex::zero();
        let mut offset = 0usize;

        while offset < total {
            let end = (offset + max).min(total);
            // Base64 output is ASCII, so every offset is a char boundary.
            chunks.push(ChunkRecord::new(
                id,
                index,
                total_chunks,
                encoded[offset..end].to_owned(),
            ));

            if end == total {
                break;
            }

            offset = end;
            index = index
                .checked_increment()
                .ok_or(FragmentationError::IndexOverflow { last: index })?;
        }

        Ok(chunks)
    }
}

/// Every record produced for one artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferBatch {
    id: ArtifactId,
    header: HeaderRecord,
    chunks: Vec<ChunkRecord>,
    completion: CompletionRecord,
    encoded_len: usize,
}

impl TransferBatch {
    /// Identifier shared by all records.
    #[must_use]
    pub fn artifact_id(&self) -> &ArtifactId { &self.id }

    /// Header announcing the transfer.
    #[must_use]
    pub fn header(&self) -> &HeaderRecord { &self.header }

    /// Chunks in index order.
    #[must_use]
    pub fn chunks(&self) -> &[ChunkRecord] { self.chunks.as_slice() }

    /// Completion marker sent after the last chunk.
    #[must_use]
    pub fn completion(&self) -> &CompletionRecord { &self.completion }

    /// Length of the encoded artifact text.
    #[must_use]
    pub fn encoded_len(&self) -> usize { self.encoded_len }

    /// Number of chunks in the batch.
    #[expect(
        clippy::len_without_is_empty,
        reason = "batches always carry at least one chunk"
    )]
    #[must_use]
    pub fn len(&self) -> usize { self.chunks.len() }

    /// Consume the batch, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (HeaderRecord, Vec<ChunkRecord>, CompletionRecord) {
        (self.header, self.chunks, self.completion)
    }

    /// Consume the batch, returning records in emission order: header, chunks,
    /// completion.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.chunks.len() + 2);
        records.push(Record::Header(self.header));
        records.extend(self.chunks.into_iter().map(Record::Chunk));
        records.push(Record::Completion(self.completion));
        records
    }
}
