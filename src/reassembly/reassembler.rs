//! Routing of inbound bus messages into the transfer registry.
//!
//! [`Reassembler::dispatch`] is called once per inbound message and never
//! fails: malformed or unexpected records are logged, counted and dropped.
//! Verified artifacts are handed to the [`ArtifactSink`] outside the registry
//! lock and the outcome is published as a [`TransferEvent`].

use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{
    AssemblyError,
    AssemblyOutcome,
    ChunkOutcome,
    ChunkProgress,
    CompletedArtifact,
    CompletionOutcome,
    EvictedTransfer,
    ReassemblyError,
    TransferRegistry,
    VerifiedArtifact,
};
use crate::{
    metrics::{self, TransferOutcome},
    record::{
        ArtifactId,
        ChunkRecord,
        CompletionRecord,
        HeaderRecord,
        Record,
        RecordError,
        TopicSet,
    },
    sink::{ArtifactSink, SinkError},
    transport::InboundMessage,
};

const EVENT_CAPACITY: usize = 64;

/// Why a transfer with every chunk present still failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The reassembled bytes did not verify.
    #[error(transparent)]
    Verification(#[from] AssemblyError),
    /// The sink refused the verified bytes.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Terminal transfer outcomes, broadcast to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// Verified and persisted.
    Completed(CompletedArtifact),
    /// Verification or persistence failed.
    Failed { id: ArtifactId, reason: String },
    /// Removed by the timeout sweep before completing.
    Evicted(EvictedTransfer),
}

/// What a single inbound message did.
#[derive(Debug)]
pub enum Disposition {
    /// A header opened a new transfer.
    Started(ArtifactId),
    /// A chunk was stored; the transfer is still collecting.
    Stored { id: ArtifactId, progress: ChunkProgress },
    /// A completion marker arrived before every chunk.
    Pending { id: ArtifactId, progress: ChunkProgress },
    /// The transfer completed and the artifact was persisted.
    Delivered(CompletedArtifact),
    /// The transfer completed but produced no artifact.
    Failed { id: ArtifactId, error: DeliveryError },
    /// The record was ignored.
    Dropped(ReassemblyError),
}

/// Applies inbound records to a shared [`TransferRegistry`].
pub struct Reassembler {
    registry: Arc<TransferRegistry>,
    sink: Arc<dyn ArtifactSink>,
    topics: TopicSet,
    events: broadcast::Sender<TransferEvent>,
}

impl std::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reassembler")
            .field("registry", &self.registry)
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}

impl Reassembler {
    /// Create a reassembler writing verified artifacts to `sink`.
    #[must_use]
    pub fn new(registry: Arc<TransferRegistry>, sink: Arc<dyn ArtifactSink>, topics: TopicSet) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            sink,
            topics,
            events,
        }
    }

    /// Registry shared with the sweeper.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransferRegistry> { &self.registry }

    /// Topics this reassembler accepts.
    #[must_use]
    pub fn topics(&self) -> &TopicSet { &self.topics }

    /// Sender side of the event channel, for components that report
    /// outcomes on the reassembler's behalf.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<TransferEvent> { self.events.clone() }

    /// Subscribe to terminal transfer outcomes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> { self.events.subscribe() }

    /// Classify, parse and apply one inbound message.
    pub async fn dispatch(&self, message: &InboundMessage) -> Disposition {
        let Some(kind) = self.topics.classify(&message.topic) else {
            return drop_record(
                RecordError::UnknownTopic {
                    topic: message.topic.clone(),
                }
                .into(),
            );
        };
        metrics::inc_records_received(kind);

        match Record::decode(kind, &message.payload) {
            Ok(Record::Header(header)) => self.handle_header(header),
            Ok(Record::Chunk(chunk)) => self.handle_chunk(chunk).await,
            Ok(Record::Completion(completion)) => self.handle_completion(&completion).await,
            Err(e) => drop_record(e.into()),
        }
    }

    /// Open a transfer for `header`.
    pub fn handle_header(&self, header: HeaderRecord) -> Disposition {
        let total_chunks = header.total_chunks;
        let artifact_size = header.artifact_size;
        match self.registry.insert_header(header) {
            Ok(id) => {
                info!(artifact = %id, total_chunks, artifact_size, "transfer started");
                Disposition::Started(id)
            }
            Err(e) => drop_record(e),
        }
    }

    /// Store `chunk`, persisting the artifact if it completes the transfer.
    pub async fn handle_chunk(&self, chunk: ChunkRecord) -> Disposition {
        let id = chunk.artifact_id();
        let index = chunk.chunk_index;
        match self.registry.insert_chunk(chunk) {
            Ok(ChunkOutcome::Stored(progress)) => {
                debug!(
                    artifact = %id,
                    chunk_index = %index,
                    received = progress.received,
                    total_chunks = progress.total,
                    "chunk stored"
                );
                Disposition::Stored { id, progress }
            }
            Ok(ChunkOutcome::Assembled(outcome)) => self.deliver(outcome).await,
            Err(e) => drop_record(e),
        }
    }

    /// Apply a completion marker.
    pub async fn handle_completion(&self, completion: &CompletionRecord) -> Disposition {
        match self.registry.try_assemble(completion) {
            Ok(CompletionOutcome::Pending { progress, missing }) => {
                let id = completion.artifact_id();
                info!(
                    artifact = %id,
                    received = progress.received,
                    total_chunks = progress.total,
                    missing = ?missing,
                    "completion marker before all chunks; waiting"
                );
                Disposition::Pending { id, progress }
            }
            Ok(CompletionOutcome::Assembled(outcome)) => self.deliver(outcome).await,
            Err(e) => drop_record(e),
        }
    }

    async fn deliver(&self, outcome: AssemblyOutcome) -> Disposition {
        match outcome {
            AssemblyOutcome::Verified(artifact) => self.persist(artifact).await,
            AssemblyOutcome::Failed { id, error } => {
                error!(artifact = %id, error = %error, "artifact failed verification; discarded");
                self.fail(id, error.into())
            }
        }
    }

    async fn persist(&self, artifact: VerifiedArtifact) -> Disposition {
        let VerifiedArtifact { id, digest, bytes } = artifact;
        match self.sink.store(&id, &bytes).await {
            Ok(location) => {
                let completed = CompletedArtifact {
                    id,
                    location,
                    size: bytes.len() as u64,
                    digest,
                    completed_at: Local::now(),
                };
                info!(
                    artifact = %completed.id,
                    size = completed.size,
                    digest = %completed.digest.short(),
                    location = %completed.location.display(),
                    "artifact stored"
                );
                self.registry.record_completed(completed.clone());
                metrics::inc_transfers(TransferOutcome::Completed);
                let _ = self.events.send(TransferEvent::Completed(completed.clone()));
                Disposition::Delivered(completed)
            }
            Err(e) => {
                error!(artifact = %id, error = %e, "failed to persist artifact");
                self.registry.record_failed();
                self.fail(id, e.into())
            }
        }
    }

    fn fail(&self, id: ArtifactId, error: DeliveryError) -> Disposition {
        metrics::inc_transfers(TransferOutcome::Failed);
        let _ = self.events.send(TransferEvent::Failed {
            id: id.clone(),
            reason: error.to_string(),
        });
        Disposition::Failed { id, error }
    }

}

fn drop_record(error: ReassemblyError) -> Disposition {
    if error.is_duplicate() {
        debug!(error = %error, "duplicate record ignored");
    } else {
        warn!(error = %error, "record dropped");
    }
    metrics::inc_records_dropped(error.reason());
    Disposition::Dropped(error)
}
