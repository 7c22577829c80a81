//! Errors raised while encoding, decoding or validating records.

use thiserror::Error;

use super::{ArtifactId, RecordKind};

/// A record that cannot be trusted. The receiver drops it without touching
/// any transfer.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The payload is not a well-formed record of the expected kind.
    #[error("malformed {kind} record: {source}")]
    Malformed {
        /// Kind implied by the topic the record arrived on.
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },
    /// The record's `type` field disagrees with its topic.
    #[error("{found} record published on {expected} topic")]
    KindMismatch {
        /// Kind implied by the topic.
        expected: RecordKind,
        /// Kind declared by the record.
        found: RecordKind,
    },
    /// The topic is not one of the transfer sub-topics.
    #[error("topic {topic} is not a transfer sub-topic")]
    UnknownTopic { topic: String },
    /// A header announced a transfer with no chunks.
    #[error("header for {id} declares no chunks")]
    EmptyTransfer { id: ArtifactId },
    /// A header announced a zero chunk size.
    #[error("header for {id} declares a zero chunk size")]
    ZeroChunkSize { id: ArtifactId },
    /// A header's chunk count does not follow from its sizes.
    #[error(
        "header for {id} declares {declared} chunks, inconsistent with {artifact_size} bytes at \
         chunk size {chunk_size}"
    )]
    GeometryMismatch {
        id: ArtifactId,
        declared: u32,
        artifact_size: u64,
        chunk_size: usize,
    },
    /// Serialising an outbound record failed.
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}
