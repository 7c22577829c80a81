use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use super::{ArtifactId, DeviceId, OriginTimestamp, RecordError};
use crate::{Digest, encoding::encoded_len};

/// Announcement of a transfer, published before any chunk.
///
/// The header fixes the shape of the transfer: how many chunks follow, how
/// large each encoded slice is and which digest the reassembled bytes must
/// match. A receiver never changes an accepted header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub device_id: DeviceId,
    pub origin_timestamp: OriginTimestamp,
    /// Digest of the raw artifact bytes, before text encoding.
    pub artifact_digest: Digest,
    pub total_chunks: u32,
    /// Encoded characters per chunk; the final chunk may be shorter.
    pub chunk_size: usize,
    /// Raw artifact length in bytes.
    pub artifact_size: u64,
}

impl HeaderRecord {
    /// Identifier of the announced transfer.
    #[must_use]
    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId::new(self.device_id.clone(), self.origin_timestamp)
    }

    /// Check that the declared chunk count agrees with the declared sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::EmptyTransfer`] when no chunks are declared,
    /// [`RecordError::ZeroChunkSize`] when the chunk size is zero and
    /// [`RecordError::GeometryMismatch`] when `total_chunks` differs from
    /// `ceil(encoded_len(artifact_size) / chunk_size)`.
    pub fn check_geometry(&self) -> Result<(), RecordError> {
        if self.total_chunks == 0 {
            return Err(RecordError::EmptyTransfer {
                id: self.artifact_id(),
            });
        }
        let Some(chunk_size) = NonZeroUsize::new(self.chunk_size) else {
            return Err(RecordError::ZeroChunkSize {
                id: self.artifact_id(),
            });
        };
        let expected = expected_chunks(self.artifact_size, chunk_size);
        if expected != Some(u64::from(self.total_chunks)) {
            return Err(RecordError::GeometryMismatch {
                id: self.artifact_id(),
                declared: self.total_chunks,
                artifact_size: self.artifact_size,
                chunk_size: self.chunk_size,
            });
        }
        Ok(())
    }
}

/// Number of chunks needed to carry `artifact_size` raw bytes.
///
/// Returns `None` when the size does not fit the platform's `usize`.
#[must_use]
pub fn expected_chunks(artifact_size: u64, chunk_size: NonZeroUsize) -> Option<u64> {
    let raw = usize::try_from(artifact_size).ok()?;
    let chunks = encoded_len(raw).div_ceil(chunk_size.get());
    u64::try_from(chunks).ok()
}
