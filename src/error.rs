//! Canonical error and result types for the crate.
//!
//! Each module owns a focused error enum. [`ChunkwireError`] gathers the ones
//! that escape to callers of the long-running entry points.

use thiserror::Error;

use crate::{fragment::FragmentationError, sink::SinkError, transport::TransportError};

/// Top-level error type exposed by `chunkwire`.
#[derive(Debug, Error)]
pub enum ChunkwireError {
    /// The bus connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// An artifact could not be fragmented or published.
    #[error("send failed: {0}")]
    Fragmentation(#[from] FragmentationError),
    /// The artifact sink could not be prepared.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    /// A local file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type defaulting to [`ChunkwireError`].
pub type Result<T, E = ChunkwireError> = std::result::Result<T, E>;
