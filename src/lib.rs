#![doc(html_root_url = "https://docs.rs/chunkwire/latest")]
//! Public API for the `chunkwire` library.
//!
//! This crate moves camera frames and other binary artifacts across a
//! publish/subscribe bus whose per-message limit is smaller than the
//! artifact. The sending side fragments an artifact into a header, digested
//! chunks and a completion marker; the receiving side reassembles chunks
//! arriving in any order, verifies the result and persists it, evicting
//! transfers that stall.

pub mod config;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod fragment;
pub mod metrics;
pub mod reassembly;
pub mod receiver;
pub mod record;
pub mod sink;
pub mod sweeper;
pub mod transport;

pub use config::{ReceiverConfig, SenderConfig};
pub use digest::Digest;
pub use error::{ChunkwireError, Result};
pub use fragment::{ArtifactSender, FragmentationError, Fragmenter, TransferBatch, TransferReport};
pub use reassembly::{
    CompletedArtifact,
    Disposition,
    Reassembler,
    ReassemblyError,
    RegistryStatus,
    TransferEvent,
    TransferRegistry,
};
pub use receiver::Receiver;
pub use record::{ArtifactId, DeviceId, OriginTimestamp, Record, RecordKind, TopicSet};
pub use sink::{ArtifactSink, FsSink, SinkError};
pub use sweeper::{Sweeper, spawn_sweeper};
pub use transport::{InboundMessage, MemoryBus, Publisher, Subscriber, TransportError};
