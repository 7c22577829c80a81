//! Receiving side of the chunked transfer protocol.
//!
//! Records from every device land in one [`TransferRegistry`]. Each accepted
//! header opens a [`ReconstructionTask`]; chunks fill it in any order and the
//! chunk that completes it triggers assembly and verification. The
//! [`Reassembler`] wraps the registry with logging, metrics and persistence.

pub mod error;
pub mod reassembler;
pub mod registry;
pub mod task;

pub use error::{AssemblyError, ReassemblyError};
pub use reassembler::{DeliveryError, Disposition, Reassembler, TransferEvent};
pub use registry::{
    AssemblyOutcome,
    ChunkOutcome,
    CompletedArtifact,
    CompletionOutcome,
    EvictedTransfer,
    PendingTransfer,
    RegistryLimits,
    RegistryStatus,
    TransferRegistry,
    VerifiedArtifact,
};
pub use task::{ChunkProgress, ReconstructionTask};

#[cfg(test)]
mod tests;
