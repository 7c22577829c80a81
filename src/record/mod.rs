//! Wire records exchanged between fragmenter and reassembler.
//!
//! Every record is a flat JSON object with a `type` discriminator and is
//! published on the sub-topic matching that type. The sub-modules keep one
//! record shape per file; [`Record`] ties them together for encoding and
//! dispatch.

mod chunk;
mod completion;
mod error;
mod header;
mod id;
mod topic;

pub use chunk::ChunkRecord;
pub use completion::CompletionRecord;
pub use error::RecordError;
pub use header::{HeaderRecord, expected_chunks};
pub use id::{ArtifactId, ChunkIndex, DeviceId, OriginTimestamp};
use serde::{Deserialize, Serialize};
pub use topic::{RecordKind, TopicSet};

/// Any record that can travel on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    Header(HeaderRecord),
    Chunk(ChunkRecord),
    Completion(CompletionRecord),
}

impl Record {
    /// Kind of this record.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Header(_) => RecordKind::Header,
            Self::Chunk(_) => RecordKind::Chunk,
            Self::Completion(_) => RecordKind::Completion,
        }
    }

    /// Identifier of the transfer the record belongs to.
    #[must_use]
    pub fn artifact_id(&self) -> ArtifactId {
        match self {
            Self::Header(header) => header.artifact_id(),
            Self::Chunk(chunk) => chunk.artifact_id(),
            Self::Completion(completion) => completion.artifact_id(),
        }
    }

    /// Serialise the record to its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Encode`] if serialisation fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        serde_json::to_vec(self).map_err(RecordError::Encode)
    }

    /// Parse a record received on a topic of kind `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Malformed`] when the payload is not a valid
    /// record (including missing fields) and [`RecordError::KindMismatch`]
    /// when the record's `type` disagrees with the topic.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunkwire::record::{Record, RecordError, RecordKind};
    /// let err = Record::decode(RecordKind::Chunk, br#"{"type":"chunk"}"#).unwrap_err();
    /// assert!(matches!(err, RecordError::Malformed { .. }));
    /// ```
    pub fn decode(expected: RecordKind, payload: &[u8]) -> Result<Self, RecordError> {
        let record: Self = serde_json::from_slice(payload).map_err(|source| {
            RecordError::Malformed {
                kind: expected,
                source,
            }
        })?;
        if record.kind() != expected {
            return Err(RecordError::KindMismatch {
                expected,
                found: record.kind(),
            });
        }
        Ok(record)
    }
}

impl From<HeaderRecord> for Record {
    fn from(value: HeaderRecord) -> Self { Self::Header(value) }
}

impl From<ChunkRecord> for Record {
    fn from(value: ChunkRecord) -> Self { Self::Chunk(value) }
}

impl From<CompletionRecord> for Record {
    fn from(value: CompletionRecord) -> Self { Self::Completion(value) }
}
