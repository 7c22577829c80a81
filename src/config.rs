//! Sender and receiver configuration.
//!
//! Defaults mirror a small camera deployment: 3 KiB chunks on
//! `esp32/camera`, transfers abandoned after a minute and swept every ten
//! seconds.

use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use crate::record::DeviceId;

/// Default base topic.
pub const DEFAULT_BASE_TOPIC: &str = "esp32/camera";
/// Default encoded characters per chunk.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(3072).unwrap();
/// Default age after which an incomplete transfer is evicted.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);
/// Default period of the timeout sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// Default cap on concurrently collecting transfers.
pub const DEFAULT_MAX_PENDING_TRANSFERS: NonZeroUsize = NonZeroUsize::new(64).unwrap();
/// Default cap on a single artifact's raw size.
pub const DEFAULT_MAX_ARTIFACT_SIZE: NonZeroUsize = NonZeroUsize::new(16 * 1024 * 1024).unwrap();
/// Default number of completed transfers remembered for status queries.
pub const DEFAULT_COMPLETED_HISTORY: usize = 256;
/// Default chunk publish rate, in messages per second.
pub const DEFAULT_PUBLISH_RATE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Settings for the sending side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderConfig {
    /// Device name stamped on every record.
    pub device_id: DeviceId,
    /// Base topic the three sub-topics derive from.
    pub base_topic: String,
    /// Encoded characters per chunk. Must match the receiver.
    pub chunk_size: NonZeroUsize,
    /// Chunk publishes per second; `None` publishes as fast as the bus allows.
    pub publish_rate: Option<NonZeroUsize>,
}

impl SenderConfig {
    /// Configuration for `device_id` with default settings.
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            base_topic: DEFAULT_BASE_TOPIC.to_owned(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            publish_rate: Some(DEFAULT_PUBLISH_RATE),
        }
    }

    /// Set the base topic.
    #[must_use]
    pub fn with_base_topic(mut self, base_topic: impl Into<String>) -> Self {
        self.base_topic = base_topic.into();
        self
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set or clear the publish rate.
    #[must_use]
    pub fn with_publish_rate(mut self, rate: Option<NonZeroUsize>) -> Self {
        self.publish_rate = rate;
        self
    }
}

impl From<DeviceId> for SenderConfig {
    fn from(device_id: DeviceId) -> Self { Self::new(device_id) }
}

/// Settings for the receiving side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Base topic the three sub-topics derive from.
    pub base_topic: String,
    /// Chunk size the receiver trusts; headers declaring another are dropped.
    pub chunk_size: NonZeroUsize,
    /// Directory for completed artifacts.
    pub output_dir: PathBuf,
    /// Age after which a collecting transfer is evicted.
    pub transfer_timeout: Duration,
    /// Period of the eviction sweep.
    pub sweep_interval: Duration,
    /// Headers are refused while this many transfers are collecting.
    pub max_pending_transfers: NonZeroUsize,
    /// Headers announcing larger artifacts are refused.
    pub max_artifact_size: NonZeroUsize,
    /// Completed transfers remembered for status queries.
    pub completed_history: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            base_topic: DEFAULT_BASE_TOPIC.to_owned(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            output_dir: PathBuf::from("received_images"),
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_pending_transfers: DEFAULT_MAX_PENDING_TRANSFERS,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
            completed_history: DEFAULT_COMPLETED_HISTORY,
        }
    }
}

impl ReceiverConfig {
    /// Set the base topic.
    #[must_use]
    pub fn with_base_topic(mut self, base_topic: impl Into<String>) -> Self {
        self.base_topic = base_topic.into();
        self
    }

    /// Set the trusted chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the transfer timeout.
    #[must_use]
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the pending-transfer cap.
    #[must_use]
    pub fn with_max_pending_transfers(mut self, max: NonZeroUsize) -> Self {
        self.max_pending_transfers = max;
        self
    }

    /// Set the artifact size cap.
    #[must_use]
    pub fn with_max_artifact_size(mut self, max: NonZeroUsize) -> Self {
        self.max_artifact_size = max;
        self
    }

    /// Set the completed-history length.
    #[must_use]
    pub fn with_completed_history(mut self, len: usize) -> Self {
        self.completed_history = len;
        self
    }

    /// Clamp durations to sane bounds.
    ///
    /// Zero durations become one millisecond and the sweep never runs less
    /// often than the timeout, so an abandoned transfer outlives its deadline
    /// by at most one timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use chunkwire::ReceiverConfig;
    ///
    /// let cfg = ReceiverConfig::default()
    ///     .with_transfer_timeout(Duration::from_secs(5))
    ///     .with_sweep_interval(Duration::from_secs(30))
    ///     .normalized();
    /// assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.transfer_timeout = self.transfer_timeout.max(MIN_PERIOD);
        self.sweep_interval = self
            .sweep_interval
            .max(MIN_PERIOD)
            .min(self.transfer_timeout);
        self
    }
}
