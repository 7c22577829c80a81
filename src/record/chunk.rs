use serde::{Deserialize, Serialize};

use super::{ArtifactId, ChunkIndex, DeviceId, OriginTimestamp};
use crate::Digest;

/// One encoded slice of an artifact.
///
/// Chunks carry the full [`ArtifactId`] so the receiver routes each one to
/// exactly one transfer, even when a device has several in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub device_id: DeviceId,
    pub origin_timestamp: OriginTimestamp,
    pub chunk_index: ChunkIndex,
    pub total_chunks: u32,
    /// Base64 text slice of the artifact.
    pub chunk_payload: String,
    /// Digest of `chunk_payload` as UTF-8 bytes.
    pub chunk_digest: Digest,
    pub is_last: bool,
}

impl ChunkRecord {
    /// Build a chunk for `id`, computing its digest and final-chunk flag.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunkwire::record::{ArtifactId, ChunkIndex, ChunkRecord, DeviceId, OriginTimestamp};
    /// let id = ArtifactId::new(DeviceId::new("cam"), OriginTimestamp::from_millis(1));
    /// let chunk = ChunkRecord::new(&id, ChunkIndex::new(1), 2, "aGk=".into());
    /// assert!(chunk.is_last);
    /// assert!(chunk.verify());
    /// ```
    #[must_use]
    pub fn new(id: &ArtifactId, chunk_index: ChunkIndex, total_chunks: u32, payload: String) -> Self {
        Self {
            device_id: id.device_id().clone(),
            origin_timestamp: id.origin_timestamp(),
            chunk_index,
            total_chunks,
            chunk_digest: Digest::of(payload.as_bytes()),
            chunk_payload: payload,
            is_last: chunk_index.get().checked_add(1) == Some(total_chunks),
        }
    }

    /// Identifier of the transfer this chunk belongs to.
    #[must_use]
    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId::new(self.device_id.clone(), self.origin_timestamp)
    }

    /// Check the payload against the carried digest.
    #[must_use]
    pub fn verify(&self) -> bool { self.chunk_digest.matches(self.chunk_payload.as_bytes()) }
}
