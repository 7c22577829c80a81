//! Error types for the receiving side.
//!
//! [`ReassemblyError`] explains why a single record was dropped; it never
//! escapes the dispatch path. [`AssemblyError`] explains why a transfer whose
//! chunks were all present still failed to produce a verified artifact.

use std::num::NonZeroUsize;

use base64::DecodeError;
use thiserror::Error;

use crate::{
    Digest,
    record::{ArtifactId, ChunkIndex, RecordError, RecordKind},
};

/// Reasons an inbound record is dropped without changing any transfer.
#[derive(Debug, Error)]
pub enum ReassemblyError {
    /// The record itself is malformed.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// A transfer with this identifier is already collecting.
    #[error("duplicate header for {id}")]
    DuplicateHeader { id: ArtifactId },
    /// The header's chunk size differs from the one this receiver trusts.
    #[error("header for {id} declares chunk size {declared}, expected {expected}")]
    ChunkSizeMismatch {
        id: ArtifactId,
        declared: usize,
        expected: NonZeroUsize,
    },
    /// The header announces an artifact larger than the configured cap.
    #[error("artifact {id} of {attempted} bytes exceeds limit of {limit} bytes")]
    ArtifactTooLarge {
        id: ArtifactId,
        attempted: u64,
        limit: NonZeroUsize,
    },
    /// Too many transfers are already collecting.
    #[error("{limit} transfers already in flight; refusing {id}")]
    RegistryFull { id: ArtifactId, limit: NonZeroUsize },
    /// A chunk or completion arrived for a transfer with no accepted header.
    #[error("no header accepted for {id}; dropping {kind} record")]
    MissingHeader { id: ArtifactId, kind: RecordKind },
    /// The chunk index was already stored.
    #[error("duplicate chunk {index} for {id}")]
    DuplicateChunk { id: ArtifactId, index: ChunkIndex },
    /// The chunk payload does not match its own digest.
    #[error("chunk {index} for {id} failed digest verification")]
    ChunkDigestMismatch { id: ArtifactId, index: ChunkIndex },
    /// The chunk index lies outside the header's declared range.
    #[error("chunk {index} for {id} outside declared range of {total} chunks")]
    IndexOutOfRange {
        id: ArtifactId,
        index: ChunkIndex,
        total: u32,
    },
    /// A record's chunk count disagrees with the header.
    #[error("{kind} record for {id} declares {found} chunks, header declared {expected}")]
    TotalMismatch {
        id: ArtifactId,
        kind: RecordKind,
        expected: u32,
        found: u32,
    },
    /// The payload length does not fit the header's geometry.
    #[error("chunk {index} for {id} carries {found} characters, expected {expected}")]
    PayloadLength {
        id: ArtifactId,
        index: ChunkIndex,
        expected: usize,
        found: usize,
    },
    /// The final-chunk flag disagrees with the chunk's position.
    #[error("chunk {index} for {id} carries an inconsistent final-chunk flag")]
    LastFlagMismatch { id: ArtifactId, index: ChunkIndex },
    /// The completion digest disagrees with the header.
    #[error("completion for {id} carries a digest that differs from its header")]
    CompletionDigestMismatch { id: ArtifactId },
}

impl ReassemblyError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Record(_) => "malformed",
            Self::DuplicateHeader { .. } => "duplicate_header",
            Self::ChunkSizeMismatch { .. } => "chunk_size_mismatch",
            Self::ArtifactTooLarge { .. } => "artifact_too_large",
            Self::RegistryFull { .. } => "registry_full",
            Self::MissingHeader { .. } => "missing_header",
            Self::DuplicateChunk { .. } => "duplicate_chunk",
            Self::ChunkDigestMismatch { .. } => "chunk_digest_mismatch",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::TotalMismatch { .. } => "total_mismatch",
            Self::LastFlagMismatch { .. } => "last_flag_mismatch",
            Self::PayloadLength { .. } => "payload_length",
            Self::CompletionDigestMismatch { .. } => "completion_digest_mismatch",
        }
    }

    /// Whether the record was a harmless repeat of one already applied.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateHeader { .. } | Self::DuplicateChunk { .. }
        )
    }
}

/// Reasons a complete transfer failed to yield a verified artifact.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// A chunk index is absent although the count says the transfer is
    /// complete. This is an internal invariant violation.
    #[error("chunk {index} missing from complete transfer {id}")]
    MissingChunk { id: ArtifactId, index: ChunkIndex },
    /// The joined text is not valid base64, even after re-padding.
    #[error("artifact {id} is not valid base64: {source}")]
    Decode {
        id: ArtifactId,
        #[source]
        source: DecodeError,
    },
    /// The decoded bytes do not hash to the header's digest.
    #[error("artifact {id} failed digest verification: expected {expected}, computed {computed}")]
    DigestMismatch {
        id: ArtifactId,
        expected: Digest,
        computed: Digest,
    },
    /// The decoded length differs from the header's declared size.
    #[error("artifact {id} decoded to {actual} bytes, header declared {expected}")]
    SizeMismatch {
        id: ArtifactId,
        expected: u64,
        actual: u64,
    },
}
