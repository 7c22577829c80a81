//! Receiving service: subscription, dispatch and sweeping.
//!
//! [`Receiver`] subscribes to the three record topics on one stream, hands
//! every message to the [`Reassembler`] and runs a [`Sweeper`] alongside.
//! Shutdown stops intake after the current message and waits for the sweeper
//! to stop.

use std::{future::Future, sync::Arc};

use futures::StreamExt;
use tokio::{select, sync::broadcast};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use crate::{
    config::ReceiverConfig,
    error::Result,
    reassembly::{Reassembler, RegistryLimits, RegistryStatus, TransferEvent, TransferRegistry},
    record::TopicSet,
    sink::ArtifactSink,
    sweeper::{Sweeper, spawn_sweeper},
    transport::{Subscriber, Subscription},
};

/// Long-running receiver for one base topic.
#[derive(Debug)]
pub struct Receiver {
    reassembler: Arc<Reassembler>,
    sweeper: Sweeper,
}

impl Receiver {
    /// Build a receiver from `config`, persisting artifacts to `sink`.
    ///
    /// The configuration is [normalized](ReceiverConfig::normalized) first.
    #[must_use]
    pub fn new(config: ReceiverConfig, sink: Arc<dyn ArtifactSink>) -> Self {
        let config = config.normalized();
        let registry = Arc::new(TransferRegistry::new(RegistryLimits::from(&config)));
        let reassembler = Arc::new(Reassembler::new(
            Arc::clone(&registry),
            sink,
            TopicSet::new(config.base_topic.as_str()),
        ));
        let sweeper =
            Sweeper::new(registry, config.sweep_interval).with_events(reassembler.event_sender());
        Self {
            reassembler,
            sweeper,
        }
    }

    /// Registry of in-flight transfers.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransferRegistry> { self.reassembler.registry() }

    /// Reassembler applying inbound records.
    #[must_use]
    pub fn reassembler(&self) -> &Arc<Reassembler> { &self.reassembler }

    /// Topics the receiver subscribes to.
    #[must_use]
    pub fn topics(&self) -> &TopicSet { self.reassembler.topics() }

    /// Subscribe to terminal transfer outcomes, evictions included.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<TransferEvent> { self.reassembler.subscribe() }

    /// Snapshot of pending and completed transfers.
    #[must_use]
    pub fn status(&self) -> RegistryStatus { self.registry().status() }

    /// Run until Ctrl-C or until the subscription ends.
    ///
    /// # Errors
    ///
    /// See [`run_with_shutdown`](Self::run_with_shutdown).
    pub async fn run<S>(&self, subscriber: &S) -> Result<()>
    where
        S: Subscriber + ?Sized,
    {
        self.run_with_shutdown(subscriber, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C; running until the subscription ends");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkwireError::Transport`](crate::ChunkwireError::Transport)
    /// if subscribing fails, or any error from [`serve`](Self::serve).
    pub async fn run_with_shutdown<S, F>(&self, subscriber: &S, shutdown: F) -> Result<()>
    where
        S: Subscriber + ?Sized,
        F: Future<Output = ()> + Send,
    {
        let subscription = self.subscribe(subscriber).await?;
        self.serve(subscription, shutdown).await
    }

    /// Subscribe to the header, chunk and completion topics on one stream.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkwireError::Transport`](crate::ChunkwireError::Transport)
    /// when the subscriber refuses.
    pub async fn subscribe<S>(&self, subscriber: &S) -> Result<Subscription>
    where
        S: Subscriber + ?Sized,
    {
        let topics = self.topics().all();
        let subscription = subscriber.subscribe(&topics).await?;
        info!(topics = ?topics, "subscribed");
        Ok(subscription)
    }

    /// Dispatch messages from `subscription` until `shutdown` resolves or the
    /// stream ends.
    ///
    /// Messages are applied in stream order, so a header is always seen
    /// before chunks the bus delivered after it. The sweeper runs on its own
    /// task for the lifetime of this call.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkwireError::Transport`](crate::ChunkwireError::Transport)
    /// if the subscription reports a connection-level error. Individual bad
    /// records never end the loop.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn serve<F>(&self, mut subscription: Subscription, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        spawn_sweeper(self.sweeper.clone(), token.clone(), &tracker);

        tokio::pin!(shutdown);
        let result = loop {
            select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
                next = subscription.next() => match next {
                    Some(Ok(message)) => {
                        self.reassembler.dispatch(&message).await;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "subscription failed");
                        break Err(e.into());
                    }
                    None => {
                        info!("subscription ended");
                        break Ok(());
                    }
                },
            }
        };

        token.cancel();
        tracker.close();
        tracker.wait().await;
        result
    }
}
