//! Publishers that record or refuse traffic, and ordered replay helpers.

use std::sync::{
    Mutex,
    PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use chunkwire::{
    record::{Record, RecordKind, TopicSet},
    transport::{Publisher, TransportError},
};

/// Records every publish, optionally refusing the `n`th attempt and all
/// later ones.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Bytes)>>,
    fail_from: Option<usize>,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    /// Accept everything.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Refuse attempt `n` (zero-based) and every later attempt.
    #[must_use]
    pub fn failing_from(n: usize) -> Self {
        Self {
            fail_from: Some(n),
            ..Self::default()
        }
    }

    /// Number of publish attempts, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> usize { self.attempts.load(Ordering::SeqCst) }

    /// Accepted messages in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Accepted messages decoded back into records.
    ///
    /// # Panics
    ///
    /// Panics if a published payload is not a valid record.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.published()
            .iter()
            .map(|(_, payload)| decode_any(payload))
            .collect()
    }
}

fn decode_any(payload: &[u8]) -> Record {
    RecordKind::ALL
        .into_iter()
        .find_map(|kind| Record::decode(kind, payload).ok())
        .unwrap_or_else(|| panic!("published payload is not a record"))
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_from.is_some_and(|n| attempt >= n) {
            return Err(TransportError::Rejected {
                topic: topic.to_owned(),
                reason: "broker unavailable".to_owned(),
            });
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_owned(), payload));
        Ok(())
    }
}

/// Publish `records` on their topics under `topics`, in the given order.
///
/// # Errors
///
/// Returns the first [`TransportError`] the publisher reports.
///
/// # Panics
///
/// Panics if a record fails to encode.
pub async fn publish_in_order<P>(
    publisher: &P,
    topics: &TopicSet,
    records: impl IntoIterator<Item = Record>,
) -> Result<(), TransportError>
where
    P: Publisher + ?Sized,
{
    for record in records {
        let payload = record
            .to_bytes()
            .unwrap_or_else(|e| panic!("record encode failed: {e}"));
        publisher
            .publish(topics.topic(record.kind()), Bytes::from(payload))
            .await?;
    }
    Ok(())
}
