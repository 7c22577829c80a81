//! Sending side of the chunked transfer protocol.
//!
//! [`Fragmenter`] turns an artifact into records; [`ArtifactSender`] pushes
//! them onto a bus in protocol order. Neither keeps state between artifacts.

pub mod error;
pub mod fragmenter;
pub mod sender;

pub use error::FragmentationError;
pub use fragmenter::{Fragmenter, TransferBatch};
pub use sender::{ArtifactSender, TransferReport};

#[cfg(test)]
mod tests;
