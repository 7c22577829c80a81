//! Loopback binary for `chunkwire`.
//!
//! Fragments each input file onto an in-process bus with a broker-style
//! payload ceiling, reassembles the stream into the output directory and
//! reports what arrived.

mod cli;

use std::{io, sync::Arc, time::Duration};

use chunkwire::{
    ArtifactSender,
    FsSink,
    MemoryBus,
    OriginTimestamp,
    Receiver,
    ReceiverConfig,
    SenderConfig,
    TransferEvent,
};
use clap::Parser;
use tokio::{sync::broadcast, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> chunkwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr
        && let Err(e) = chunkwire::metrics::install_prometheus(addr)
    {
        warn!(error = %e, %addr, "failed to install Prometheus exporter");
    }
    #[cfg(not(feature = "metrics"))]
    if cli.metrics_addr.is_some() {
        warn!("built without the metrics feature; ignoring --metrics-addr");
    }

    let timeout = Duration::from_secs(cli.timeout_secs);
    let config = ReceiverConfig::default()
        .with_base_topic(cli.base_topic.as_str())
        .with_chunk_size(cli.chunk_size)
        .with_output_dir(cli.output_dir.as_path())
        .with_transfer_timeout(timeout)
        .with_sweep_interval(Duration::from_secs(cli.sweep_interval_secs));
    let sink = FsSink::new(config.output_dir.as_path());
    sink.ensure_dir().await?;

    let bus = MemoryBus::with_max_payload(cli.max_payload);
    let receiver = Arc::new(Receiver::new(config, Arc::new(sink)));
    let subscription = receiver.subscribe(&bus).await?;
    let mut events = receiver.events();
    let shutdown = CancellationToken::new();
    let serving = tokio::spawn({
        let receiver = Arc::clone(&receiver);
        let shutdown = shutdown.clone();
        async move { receiver.serve(subscription, shutdown.cancelled_owned()).await }
    });

    let sender = ArtifactSender::new(
        &SenderConfig::new(cli.device_id.as_str())
            .with_base_topic(cli.base_topic.as_str())
            .with_chunk_size(cli.chunk_size)
            .with_publish_rate(std::num::NonZeroUsize::new(cli.publish_rate)),
    );

    let mut sent = 0usize;
    let mut last_stamp = 0u64;
    for path in &cli.inputs {
        let artifact = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read input; skipping");
                continue;
            }
        };
        // Stamps must be unique per device or the receiver sees a duplicate header.
        let stamp = OriginTimestamp::now().as_millis().max(last_stamp + 1);
        last_stamp = stamp;
        match sender
            .send_at(&bus, &artifact, OriginTimestamp::from_millis(stamp))
            .await
        {
            Ok(report) => {
                info!(path = %path.display(), artifact = %report.id, chunks = report.total_chunks, "queued");
                sent += 1;
            }
            Err(e) => error!(path = %path.display(), error = %e, "send failed"),
        }
    }

    let finished = await_outcomes(&mut events, sent, timeout).await;
    if finished < sent {
        warn!(finished, sent, "not every transfer reached a terminal state");
    }

    shutdown.cancel();
    serving.await.map_err(io::Error::other)??;

    let status = receiver.status();
    info!(
        completed = status.completed_total,
        failed = status.failed_total,
        evicted = status.evicted_total,
        pending = status.pending.len(),
        "loopback finished"
    );
    for artifact in &status.recent {
        info!(artifact = %artifact.id, location = %artifact.location.display(), "stored");
    }
    Ok(())
}

async fn await_outcomes(
    events: &mut broadcast::Receiver<TransferEvent>,
    expected: usize,
    timeout: Duration,
) -> usize {
    let mut finished = 0;
    let deadline = time::Instant::now() + timeout;
    while finished < expected {
        match time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(_)) => finished += 1,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                finished += usize::try_from(skipped).unwrap_or(usize::MAX);
            }
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
        }
    }
    finished
}
