//! Publish/subscribe seam between the protocol core and a message bus.
//!
//! The core never connects to a broker itself. Senders are handed a
//! [`Publisher`] and receivers a [`Subscriber`]; [`MemoryBus`] implements both
//! in process and enforces a broker-style payload ceiling, which is what the
//! chunking protocol exists to satisfy.

use std::{
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    Stream,
    StreamExt,
    channel::mpsc::{self, UnboundedSender},
};
use thiserror::Error;

/// Errors raised by a transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection or bus has gone away.
    #[error("transport closed")]
    Closed,
    /// The broker refused a publish.
    #[error("publish to {topic} rejected: {reason}")]
    Rejected { topic: String, reason: String },
    /// The payload exceeds the broker's per-message limit.
    #[error("payload of {size} bytes for {topic} exceeds broker limit of {limit} bytes")]
    PayloadTooLarge {
        topic: String,
        size: usize,
        limit: usize,
    },
    /// The subscription could not be established.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// A message delivered by a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    /// Construct a message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of inbound messages. An `Err` item is a connection-level failure.
pub type Subscription = Pin<Box<dyn Stream<Item = Result<InboundMessage, TransportError>> + Send>>;

/// Outbound half of a bus connection.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the bus refuses the message.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;
}

/// Inbound half of a bus connection.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribe to every topic in `topics` on one stream.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the subscription cannot be set up.
    async fn subscribe(&self, topics: &[String]) -> Result<Subscription, TransportError>;
}

#[derive(Debug)]
struct Route {
    topics: Vec<String>,
    tx: UnboundedSender<Result<InboundMessage, TransportError>>,
}

#[derive(Debug, Default)]
struct BusState {
    routes: Vec<Route>,
    closed: bool,
}

/// In-process bus with exact-match topic routing.
///
/// Cloning yields another handle to the same bus.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use chunkwire::transport::{MemoryBus, Publisher, Subscriber};
/// use futures::StreamExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bus = MemoryBus::new();
/// let mut sub = bus.subscribe(&["a/header".to_owned()]).await.unwrap();
/// bus.publish("a/header", Bytes::from_static(b"{}")).await.unwrap();
/// let msg = sub.next().await.unwrap().unwrap();
/// assert_eq!(msg.topic, "a/header");
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
    max_payload: Option<usize>,
}

impl MemoryBus {
    /// Create a bus without a payload ceiling.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a bus that rejects payloads larger than `limit` bytes.
    #[must_use]
    pub fn with_max_payload(limit: usize) -> Self {
        Self {
            state: Arc::default(),
            max_payload: Some(limit),
        }
    }

    /// Configured payload ceiling, if any.
    #[must_use]
    pub fn max_payload(&self) -> Option<usize> { self.max_payload }

    /// Close the bus. Publishes fail with [`TransportError::Closed`] and open
    /// subscriptions end after draining.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        state.routes.clear();
    }

    /// Fail every open subscription with `error` and close the bus.
    pub fn fail(&self, error: &TransportError) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for route in state.routes.drain(..) {
            let _ = route.tx.unbounded_send(Err(error.clone()));
        }
        state.closed = true;
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        if let Some(limit) = self.max_payload
            && payload.len() > limit
        {
            return Err(TransportError::PayloadTooLarge {
                topic: topic.to_owned(),
                size: payload.len(),
                limit,
            });
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.routes.retain(|route| {
            if !route.topics.iter().any(|t| t == topic) {
                return !route.tx.is_closed();
            }
            route
                .tx
                .unbounded_send(Ok(InboundMessage::new(topic, payload.clone())))
                .is_ok()
        });
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryBus {
    async fn subscribe(&self, topics: &[String]) -> Result<Subscription, TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(TransportError::Closed);
        }
        let (tx, rx) = mpsc::unbounded();
        state.routes.push(Route {
            topics: topics.to_vec(),
            tx,
        });
        Ok(rx.boxed())
    }
}
