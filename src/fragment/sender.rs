//! Emission of a fragmented artifact onto a bus.
//!
//! [`ArtifactSender`] publishes the header first, then every chunk in index
//! order, then the completion marker. The first publish failure abandons the
//! attempt; there is no per-chunk retry because the next capture cycle
//! retransmits the whole artifact.

use std::{fmt, time::Duration};

use bytes::Bytes;
use leaky_bucket::RateLimiter;
use tracing::{debug, info, warn};

use super::{FragmentationError, Fragmenter, TransferBatch};
use crate::{
    config::SenderConfig,
    metrics,
    record::{ArtifactId, ChunkIndex, DeviceId, OriginTimestamp, Record, TopicSet},
    transport::Publisher,
};

/// Summary of a transfer whose records were all accepted by the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReport {
    pub id: ArtifactId,
    pub artifact_size: u64,
    pub encoded_size: usize,
    pub total_chunks: u32,
}

/// Fragments artifacts for one device and publishes them.
pub struct ArtifactSender {
    device_id: DeviceId,
    topics: TopicSet,
    fragmenter: Fragmenter,
    limiter: Option<RateLimiter>,
}

impl fmt::Debug for ArtifactSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSender")
            .field("device_id", &self.device_id)
            .field("topics", &self.topics)
            .field("fragmenter", &self.fragmenter)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl ArtifactSender {
    /// Build a sender from `config`.
    #[must_use]
    pub fn new(config: &SenderConfig) -> Self {
        let limiter = config.publish_rate.map(|rate| {
            let rate = rate.get();
            RateLimiter::builder()
                .initial(rate)
                .refill(rate)
                .interval(Duration::from_secs(1))
                .max(rate)
                .build()
        });
        Self {
            device_id: config.device_id.clone(),
            topics: TopicSet::new(config.base_topic.as_str()),
            fragmenter: Fragmenter::new(config.chunk_size),
            limiter,
        }
    }

    /// Fragmenter used for this device.
    #[must_use]
    pub fn fragmenter(&self) -> &Fragmenter { &self.fragmenter }

    /// Topics records are published on.
    #[must_use]
    pub fn topics(&self) -> &TopicSet { &self.topics }

    /// Fragment and publish `artifact`, stamping it with the current time.
    ///
    /// # Errors
    ///
    /// See [`send_at`](Self::send_at).
    pub async fn send<P>(
        &self,
        publisher: &P,
        artifact: &[u8],
    ) -> Result<TransferReport, FragmentationError>
    where
        P: Publisher + ?Sized,
    {
        self.send_at(publisher, artifact, OriginTimestamp::now())
            .await
    }

    /// Fragment and publish `artifact` under an explicit origin timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::EmptyArtifact`] for empty input and
    /// [`FragmentationError::Publish`] for the first record the bus refuses.
    pub async fn send_at<P>(
        &self,
        publisher: &P,
        artifact: &[u8],
        origin_timestamp: OriginTimestamp,
    ) -> Result<TransferReport, FragmentationError>
    where
        P: Publisher + ?Sized,
    {
        let id = ArtifactId::new(self.device_id.clone(), origin_timestamp);
        let batch = self.fragmenter.fragment(id, artifact)?;
        self.publish_batch(publisher, batch).await
    }

    /// Publish every record of `batch` in emission order.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::Publish`] for the first record the bus
    /// refuses; later records are not attempted.
    pub async fn publish_batch<P>(
        &self,
        publisher: &P,
        batch: TransferBatch,
    ) -> Result<TransferReport, FragmentationError>
    where
        P: Publisher + ?Sized,
    {
        let report = TransferReport {
            id: batch.artifact_id().clone(),
            artifact_size: batch.header().artifact_size,
            encoded_size: batch.encoded_len(),
            total_chunks: batch.header().total_chunks,
        };
        info!(
            artifact = %report.id,
            artifact_size = report.artifact_size,
            encoded_size = report.encoded_size,
            total_chunks = report.total_chunks,
            chunk_size = self.fragmenter.chunk_size().get(),
            "sending artifact"
        );

        for record in batch.into_records() {
            if matches!(record, Record::Chunk(_))
                && let Some(limiter) = &self.limiter
            {
                limiter.acquire_one().await;
            }
            self.publish_record(publisher, &report.id, &record).await?;
        }

        info!(artifact = %report.id, "artifact sent");
        Ok(report)
    }

    async fn publish_record<P>(
        &self,
        publisher: &P,
        id: &ArtifactId,
        record: &Record,
    ) -> Result<(), FragmentationError>
    where
        P: Publisher + ?Sized,
    {
        let kind = record.kind();
        let chunk_index = chunk_index_of(record);
        let payload = Bytes::from(record.to_bytes()?);

        if let Err(source) = publisher.publish(self.topics.topic(kind), payload).await {
            warn!(artifact = %id, %kind, ?chunk_index, error = %source, "publish failed; abandoning transfer");
            metrics::inc_publish_failures();
            return Err(FragmentationError::Publish {
                id: id.clone(),
                kind,
                chunk_index,
                source,
            });
        }
        metrics::inc_records_sent(kind);

        if let Record::Chunk(chunk) = record {
            debug!(
                artifact = %id,
                chunk_index = %chunk.chunk_index,
                total_chunks = chunk.total_chunks,
                "chunk published"
            );
        }
        Ok(())
    }
}

fn chunk_index_of(record: &Record) -> Option<ChunkIndex> {
    match record {
        Record::Chunk(chunk) => Some(chunk.chunk_index),
        Record::Header(_) | Record::Completion(_) => None,
    }
}
