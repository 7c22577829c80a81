//! Errors raised while fragmenting and emitting an artifact.

use thiserror::Error;

use crate::{
    record::{ArtifactId, ChunkIndex, RecordError, RecordKind},
    transport::TransportError,
};

/// Reasons a transfer attempt is abandoned on the sending side.
///
/// Any of these ends the current attempt; the caller decides whether to
/// retry the whole artifact later.
#[derive(Debug, Error)]
pub enum FragmentationError {
    /// There is nothing to send.
    #[error("artifact is empty")]
    EmptyArtifact,
    /// The chunk index cannot advance because it would overflow `u32`.
    #[error("chunk index overflow after {last}")]
    IndexOverflow { last: ChunkIndex },
    /// Serialising a record failed.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// The bus refused a record.
    #[error("failed to publish {kind} record{} for {id}: {source}", chunk_suffix(.chunk_index))]
    Publish {
        id: ArtifactId,
        kind: RecordKind,
        chunk_index: Option<ChunkIndex>,
        #[source]
        source: TransportError,
    },
}

fn chunk_suffix(index: &Option<ChunkIndex>) -> String {
    index.map(|i| format!(" {i}")).unwrap_or_default()
}
