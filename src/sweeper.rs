//! Periodic eviction of stale transfers.
//!
//! The sweeper shares the [`TransferRegistry`] with the reassembler and
//! coordinates with it only through the registry lock. Every tick evicts the
//! transfers whose age has reached the configured timeout.

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::broadcast,
    time::{self, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error};

use crate::{
    metrics::{self, TransferOutcome},
    reassembly::{EvictedTransfer, TransferEvent, TransferRegistry},
};

/// Evicts expired transfers on a fixed interval.
#[derive(Clone, Debug)]
pub struct Sweeper {
    registry: Arc<TransferRegistry>,
    interval: Duration,
    events: Option<broadcast::Sender<TransferEvent>>,
}

impl Sweeper {
    /// Sweep `registry` every `interval`.
    #[must_use]
    pub fn new(registry: Arc<TransferRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            events: None,
        }
    }

    /// Broadcast an [`TransferEvent::Evicted`] for every eviction.
    #[must_use]
    pub fn with_events(mut self, events: broadcast::Sender<TransferEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Interval between sweeps.
    #[must_use]
    pub fn interval(&self) -> Duration { self.interval }

    /// Run one sweep now, reporting every eviction.
    #[must_use]
    pub fn sweep(&self) -> Vec<EvictedTransfer> {
        let evicted = self.registry.sweep_expired();
        for transfer in &evicted {
            error!(
                artifact = %transfer.id,
                received = transfer.progress.received,
                total_chunks = transfer.progress.total,
                age_ms = u64::try_from(transfer.age.as_millis()).unwrap_or(u64::MAX),
                "transfer timed out; evicted"
            );
            metrics::inc_transfers(TransferOutcome::Evicted);
            if let Some(events) = &self.events {
                let _ = events.send(TransferEvent::Evicted(transfer.clone()));
            }
        }
        evicted
    }

    /// Sweep until `shutdown` is cancelled.
    ///
    /// The first sweep happens one full interval after start.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            select! {
                biased;

                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    if !evicted.is_empty() {
                        debug!(count = evicted.len(), "sweep evicted transfers");
                    }
                }
            }
        }
        debug!("sweeper stopped");
    }
}

/// Spawn `sweeper` on `tracker`, stopping when `shutdown` is cancelled.
pub fn spawn_sweeper(sweeper: Sweeper, shutdown: CancellationToken, tracker: &TaskTracker) {
    tracker.spawn(sweeper.run(shutdown));
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use tracing_test::traced_test;

    use super::*;
    use crate::{
        fragment::Fragmenter,
        reassembly::RegistryLimits,
        record::{ArtifactId, DeviceId, OriginTimestamp},
    };

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn registry_with_transfer() -> (Arc<TransferRegistry>, ArtifactId) {
        let limits = RegistryLimits {
            chunk_size: NonZeroUsize::new(4).expect("non-zero"),
            transfer_timeout: TIMEOUT,
            ..RegistryLimits::default()
        };
        let registry = Arc::new(TransferRegistry::new(limits));
        let id = ArtifactId::new(DeviceId::new("cam"), OriginTimestamp::from_millis(1));
        let (header, _, _) = Fragmenter::new(limits.chunk_size)
            .fragment(id.clone(), b"abcdefgh")
            .expect("fragment")
            .into_parts();
        registry.insert_header(header).expect("header");
        (registry, id)
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_after_timeout_and_reports() {
        let (registry, id) = registry_with_transfer();
        let (tx, mut rx) = broadcast::channel(4);
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        spawn_sweeper(
            Sweeper::new(Arc::clone(&registry), Duration::from_secs(10)).with_events(tx),
            token.clone(),
            &tracker,
        );

        time::sleep(Duration::from_secs(55)).await;
        assert!(registry.contains(&id));

        time::sleep(Duration::from_secs(10)).await;
        assert!(!registry.contains(&id));
        assert!(matches!(
            rx.try_recv(),
            Ok(TransferEvent::Evicted(EvictedTransfer { id: evicted, .. })) if evicted == id
        ));

        token.cancel();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancellation() {
        let (registry, id) = registry_with_transfer();
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        spawn_sweeper(
            Sweeper::new(Arc::clone(&registry), Duration::from_secs(10)),
            token.clone(),
            &tracker,
        );

        token.cancel();
        tracker.close();
        tracker.wait().await;

        time::sleep(TIMEOUT * 2).await;
        assert!(registry.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn manual_sweep_respects_timeout() {
        let (registry, id) = registry_with_transfer();
        let sweeper = Sweeper::new(Arc::clone(&registry), Duration::from_secs(10));

        time::advance(TIMEOUT - Duration::from_millis(1)).await;
        assert!(sweeper.sweep().is_empty());

        time::advance(Duration::from_millis(1)).await;
        let evicted = sweeper.sweep();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, id);
        assert!(logs_contain("transfer timed out; evicted"));
    }
}
