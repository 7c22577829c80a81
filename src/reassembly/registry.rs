//! Shared table of in-flight transfers.
//!
//! [`TransferRegistry`] owns every [`ReconstructionTask`] behind one lock.
//! Inserting a header, storing a chunk, assembling a complete transfer and
//! sweeping expired ones each run as a single critical section, so a task is
//! never observed half-updated and never assembled twice. Persistence happens
//! after the lock is released; the registry hands out verified bytes and is
//! told the outcome afterwards.

use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroUsize,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};

use super::{AssemblyError, ChunkProgress, ReassemblyError, ReconstructionTask};
use crate::{
    Digest,
    config::ReceiverConfig,
    metrics,
    record::{ArtifactId, ChunkIndex, ChunkRecord, CompletionRecord, HeaderRecord, RecordKind},
};

/// Limits applied by a [`TransferRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryLimits {
    /// Chunk size every accepted header must declare.
    pub chunk_size: NonZeroUsize,
    /// Maximum number of transfers collecting at once.
    pub max_pending: NonZeroUsize,
    /// Maximum declared raw artifact size in bytes.
    pub max_artifact_size: NonZeroUsize,
    /// Age after which an incomplete transfer is evicted.
    pub transfer_timeout: Duration,
    /// Number of completed artifacts remembered for status queries.
    pub completed_history: usize,
}

impl From<&ReceiverConfig> for RegistryLimits {
    fn from(config: &ReceiverConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_pending: config.max_pending_transfers,
            max_artifact_size: config.max_artifact_size,
            transfer_timeout: config.transfer_timeout,
            completed_history: config.completed_history,
        }
    }
}

impl Default for RegistryLimits {
    fn default() -> Self { Self::from(&ReceiverConfig::default()) }
}

/// Artifact whose chunks were joined, decoded and verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub id: ArtifactId,
    pub digest: Digest,
    pub bytes: Vec<u8>,
}

/// Result of assembling a transfer whose chunks were all present.
///
/// Either way the task has already left the registry.
#[derive(Debug, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// Bytes ready to persist.
    Verified(VerifiedArtifact),
    /// Verification failed; the artifact is discarded.
    Failed { id: ArtifactId, error: AssemblyError },
}

/// Effect of storing a chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Stored; more chunks are outstanding.
    Stored(ChunkProgress),
    /// That chunk completed the transfer, which was assembled.
    Assembled(AssemblyOutcome),
}

/// Effect of a completion record.
#[derive(Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Chunks are still outstanding; the task keeps waiting.
    Pending {
        progress: ChunkProgress,
        missing: Vec<ChunkIndex>,
    },
    /// Every chunk was already present and the transfer was assembled.
    Assembled(AssemblyOutcome),
}

/// An artifact that reached the sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedArtifact {
    pub id: ArtifactId,
    pub location: PathBuf,
    pub size: u64,
    pub digest: Digest,
    pub completed_at: DateTime<Local>,
}

/// A transfer removed by the timeout sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictedTransfer {
    pub id: ArtifactId,
    pub progress: ChunkProgress,
    pub age: Duration,
}

/// Progress of one collecting transfer, as reported by
/// [`TransferRegistry::status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransfer {
    pub id: ArtifactId,
    pub progress: ChunkProgress,
    pub age: Duration,
}

/// Point-in-time view of the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    /// Transfers still collecting, ordered by identifier.
    pub pending: Vec<PendingTransfer>,
    /// Most recent completed artifacts, oldest first.
    pub recent: Vec<CompletedArtifact>,
    pub completed_total: u64,
    pub failed_total: u64,
    pub evicted_total: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    tasks: HashMap<ArtifactId, ReconstructionTask>,
    recent: VecDeque<CompletedArtifact>,
    completed_total: u64,
    failed_total: u64,
    evicted_total: u64,
}

impl RegistryState {
    fn take_and_assemble(&mut self, id: &ArtifactId) -> Option<AssemblyOutcome> {
        let task = self.tasks.remove(id)?;
        metrics::set_pending(self.tasks.len());
        let outcome = match task.assemble() {
            Ok(bytes) => AssemblyOutcome::Verified(VerifiedArtifact {
                id: id.clone(),
                digest: task.header().artifact_digest.clone(),
                bytes,
            }),
            Err(error) => {
                self.failed_total += 1;
                AssemblyOutcome::Failed {
                    id: id.clone(),
                    error,
                }
            }
        };
        Some(outcome)
    }
}

/// Thread-safe table of reconstruction tasks keyed by [`ArtifactId`].
///
/// # Examples
///
/// ```
/// use chunkwire::{
///     fragment::Fragmenter,
///     reassembly::{AssemblyOutcome, ChunkOutcome, RegistryLimits, TransferRegistry},
///     record::{ArtifactId, DeviceId, OriginTimestamp},
/// };
///
/// let limits = RegistryLimits::default();
/// let registry = TransferRegistry::new(limits);
/// let id = ArtifactId::new(DeviceId::new("cam"), OriginTimestamp::from_millis(7));
/// let (header, chunks, _) = Fragmenter::new(limits.chunk_size)
///     .fragment(id, b"frame")
///     .unwrap()
///     .into_parts();
///
/// registry.insert_header(header).unwrap();
/// let mut last = None;
/// for chunk in chunks {
///     last = Some(registry.insert_chunk(chunk).unwrap());
/// }
/// let Some(ChunkOutcome::Assembled(AssemblyOutcome::Verified(artifact))) = last else {
///     panic!("expected a verified artifact");
/// };
/// assert_eq!(artifact.bytes, b"frame");
/// assert_eq!(registry.pending_len(), 0);
/// ```
#[derive(Debug)]
pub struct TransferRegistry {
    limits: RegistryLimits,
    state: Mutex<RegistryState>,
}

fn now() -> Instant { tokio::time::Instant::now().into_std() }

impl TransferRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Limits this registry enforces.
    #[must_use]
    pub fn limits(&self) -> &RegistryLimits { &self.limits }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a transfer for `header`, timestamped now.
    ///
    /// # Errors
    ///
    /// See [`insert_header_at`](Self::insert_header_at).
    pub fn insert_header(&self, header: HeaderRecord) -> Result<ArtifactId, ReassemblyError> {
        self.insert_header_at(header, now())
    }

    /// Open a transfer for `header`, timestamped `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::Record`] for inconsistent geometry,
    /// [`ReassemblyError::ChunkSizeMismatch`] or
    /// [`ReassemblyError::ArtifactTooLarge`] when the header breaks a limit,
    /// [`ReassemblyError::DuplicateHeader`] when the transfer already exists
    /// and [`ReassemblyError::RegistryFull`] when no slot is free. The
    /// registry is unchanged in every error case.
    pub fn insert_header_at(
        &self,
        header: HeaderRecord,
        now: Instant,
    ) -> Result<ArtifactId, ReassemblyError> {
        header.check_geometry()?;
        let id = header.artifact_id();
        if header.chunk_size != self.limits.chunk_size.get() {
            return Err(ReassemblyError::ChunkSizeMismatch {
                id,
                declared: header.chunk_size,
                expected: self.limits.chunk_size,
            });
        }
        if header.artifact_size > self.limits.max_artifact_size.get() as u64 {
            return Err(ReassemblyError::ArtifactTooLarge {
                id,
                attempted: header.artifact_size,
                limit: self.limits.max_artifact_size,
            });
        }

        let mut state = self.lock();
        if state.tasks.contains_key(&id) {
            return Err(ReassemblyError::DuplicateHeader { id });
        }
        if state.tasks.len() >= self.limits.max_pending.get() {
            return Err(ReassemblyError::RegistryFull {
                id,
                limit: self.limits.max_pending,
            });
        }
        state
            .tasks
            .insert(id.clone(), ReconstructionTask::new(header, now));
        metrics::set_pending(state.tasks.len());
        Ok(id)
    }

    /// Store `chunk` in its transfer, assembling the transfer if this chunk
    /// completes it.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::MissingHeader`] when no transfer is open for
    /// the chunk's identifier, or any error from
    /// [`ReconstructionTask::accept`]. The registry is unchanged in every
    /// error case.
    pub fn insert_chunk(&self, chunk: ChunkRecord) -> Result<ChunkOutcome, ReassemblyError> {
        let id = chunk.artifact_id();
        let mut state = self.lock();
        let Some(task) = state.tasks.get_mut(&id) else {
            return Err(ReassemblyError::MissingHeader {
                id,
                kind: RecordKind::Chunk,
            });
        };
        let progress = task.accept(chunk)?;
        if !progress.is_complete() {
            return Ok(ChunkOutcome::Stored(progress));
        }
        match state.take_and_assemble(&id) {
            Some(outcome) => Ok(ChunkOutcome::Assembled(outcome)),
            None => Ok(ChunkOutcome::Stored(progress)),
        }
    }

    /// Apply a completion marker.
    ///
    /// A marker is advisory: completeness is decided by chunk count alone.
    /// It assembles only a transfer whose chunks are all present; otherwise
    /// the transfer keeps waiting for the rest.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::MissingHeader`] when no transfer is open,
    /// [`ReassemblyError::CompletionDigestMismatch`] or
    /// [`ReassemblyError::TotalMismatch`] when the marker disagrees with the
    /// header.
    pub fn try_assemble(
        &self,
        completion: &CompletionRecord,
    ) -> Result<CompletionOutcome, ReassemblyError> {
        let id = completion.artifact_id();
        let mut state = self.lock();
        let Some(task) = state.tasks.get(&id) else {
            return Err(ReassemblyError::MissingHeader {
                id,
                kind: RecordKind::Completion,
            });
        };
        let header = task.header();
        if header.artifact_digest != completion.artifact_digest {
            return Err(ReassemblyError::CompletionDigestMismatch { id });
        }
        if header.total_chunks != completion.total_chunks {
            return Err(ReassemblyError::TotalMismatch {
                id,
                kind: RecordKind::Completion,
                expected: header.total_chunks,
                found: completion.total_chunks,
            });
        }
        let progress = task.progress();
        if !progress.is_complete() {
            return Ok(CompletionOutcome::Pending {
                progress,
                missing: task.missing_indices(),
            });
        }
        match state.take_and_assemble(&id) {
            Some(outcome) => Ok(CompletionOutcome::Assembled(outcome)),
            None => Ok(CompletionOutcome::Pending {
                progress,
                missing: Vec::new(),
            }),
        }
    }

    /// Evict every transfer older than the configured timeout.
    #[must_use]
    pub fn sweep_expired(&self) -> Vec<EvictedTransfer> { self.sweep_expired_at(now()) }

    /// Evict every transfer whose age at `now` is at least the configured
    /// timeout. Evicted transfers are returned in identifier order.
    #[must_use]
    pub fn sweep_expired_at(&self, now: Instant) -> Vec<EvictedTransfer> {
        let timeout = self.limits.transfer_timeout;
        let mut state = self.lock();
        let mut evicted = Vec::new();
        state.tasks.retain(|id, task| {
            let age = task.age(now);
            if age < timeout {
                return true;
            }
            evicted.push(EvictedTransfer {
                id: id.clone(),
                progress: task.progress(),
                age,
            });
            false
        });
        if !evicted.is_empty() {
            state.evicted_total += evicted.len() as u64;
            metrics::set_pending(state.tasks.len());
        }
        evicted.sort_by(|a, b| a.id.cmp(&b.id));
        evicted
    }

    /// Remember an artifact the sink accepted.
    pub fn record_completed(&self, artifact: CompletedArtifact) {
        let mut state = self.lock();
        state.completed_total += 1;
        if self.limits.completed_history == 0 {
            return;
        }
        while state.recent.len() >= self.limits.completed_history {
            state.recent.pop_front();
        }
        state.recent.push_back(artifact);
    }

    /// Count a verified artifact the sink refused.
    pub fn record_failed(&self) { self.lock().failed_total += 1; }

    /// Number of transfers collecting chunks.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.lock().tasks.len() }

    /// Whether a transfer is collecting for `id`.
    #[must_use]
    pub fn contains(&self, id: &ArtifactId) -> bool { self.lock().tasks.contains_key(id) }

    /// Progress of the transfer for `id`, if one is collecting.
    #[must_use]
    pub fn progress(&self, id: &ArtifactId) -> Option<ChunkProgress> {
        self.lock().tasks.get(id).map(ReconstructionTask::progress)
    }

    /// Snapshot of pending transfers, recent completions and totals.
    #[must_use]
    pub fn status(&self) -> RegistryStatus { self.status_at(now()) }

    /// Snapshot with ages measured at `now`.
    #[must_use]
    pub fn status_at(&self, now: Instant) -> RegistryStatus {
        let state = self.lock();
        let mut pending: Vec<_> = state
            .tasks
            .values()
            .map(|task| PendingTransfer {
                id: task.id().clone(),
                progress: task.progress(),
                age: task.age(now),
            })
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        RegistryStatus {
            pending,
            recent: state.recent.iter().cloned().collect(),
            completed_total: state.completed_total,
            failed_total: state.failed_total,
            evicted_total: state.evicted_total,
        }
    }
}
