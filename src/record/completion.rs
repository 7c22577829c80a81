use serde::{Deserialize, Serialize};

use super::{ArtifactId, DeviceId, OriginTimestamp};
use crate::Digest;

/// Advisory end-of-transfer marker.
///
/// Receivers use it only to re-check completeness; a transfer may finish from
/// chunk arrivals alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub device_id: DeviceId,
    pub origin_timestamp: OriginTimestamp,
    pub artifact_digest: Digest,
    pub total_chunks: u32,
}

impl CompletionRecord {
    /// Identifier of the transfer being closed.
    #[must_use]
    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId::new(self.device_id.clone(), self.origin_timestamp)
    }
}
