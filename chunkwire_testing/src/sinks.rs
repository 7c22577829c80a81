//! In-memory artifact sinks.

use std::{
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use chunkwire::{
    record::ArtifactId,
    sink::{ArtifactSink, SinkError},
};

/// Keeps every stored artifact in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<Vec<(ArtifactId, Vec<u8>)>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Artifacts stored so far, in store order.
    #[must_use]
    pub fn stored(&self) -> Vec<(ArtifactId, Vec<u8>)> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bytes stored for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &ArtifactId) -> Option<Vec<u8>> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(stored, _)| stored == id)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn store(&self, id: &ArtifactId, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id.clone(), bytes.to_vec()));
        Ok(PathBuf::from(format!("memory://{id}")))
    }
}

/// Refuses every artifact.
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl ArtifactSink for FailingSink {
    async fn store(&self, id: &ArtifactId, _bytes: &[u8]) -> Result<PathBuf, SinkError> {
        Err(SinkError::Rejected {
            id: id.clone(),
            reason: "sink unavailable".to_owned(),
        })
    }
}
