//! Identifiers shared by every record of a transfer.
//!
//! A transfer is named by the pair `(device_id, origin_timestamp)`. Both halves
//! travel on every record so the receiver can route chunks without guessing.

use std::{fmt, num::TryFromIntError};

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Name of the sending device, as configured on the sender.
///
/// # Examples
///
/// ```
/// use chunkwire::record::DeviceId;
/// let device = DeviceId::new("cam-01");
/// assert_eq!(device.as_str(), "cam-01");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str { self.0.as_str() }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Capture time of an artifact in milliseconds since the Unix epoch.
///
/// Identifier matching requires exact equality, so the value is an integer
/// rather than a float.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct OriginTimestamp(u64);

impl OriginTimestamp {
    /// Wrap a millisecond count.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self { Self(millis) }

    /// Read the wall clock.
    #[must_use]
    pub fn now() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self(u64::try_from(millis).unwrap_or_default())
    }

    /// Return the millisecond count.
    #[must_use]
    pub const fn as_millis(self) -> u64 { self.0 }
}

/// Composite key naming one transfer.
///
/// # Examples
///
/// ```
/// use chunkwire::record::{ArtifactId, DeviceId, OriginTimestamp};
/// let id = ArtifactId::new(DeviceId::new("cam"), OriginTimestamp::from_millis(17));
/// assert_eq!(id.to_string(), "cam_17");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    device_id: DeviceId,
    origin_timestamp: OriginTimestamp,
}

impl ArtifactId {
    /// Build an identifier from its two halves.
    #[must_use]
    pub const fn new(device_id: DeviceId, origin_timestamp: OriginTimestamp) -> Self {
        Self {
            device_id,
            origin_timestamp,
        }
    }

    /// Device that produced the artifact.
    #[must_use]
    pub const fn device_id(&self) -> &DeviceId { &self.device_id }

    /// Capture time announced by the device.
    #[must_use]
    pub const fn origin_timestamp(&self) -> OriginTimestamp { self.origin_timestamp }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.device_id, self.origin_timestamp)
    }
}

/// Zero-based position of a chunk within its transfer.
///
/// # Examples
///
/// ```
/// use chunkwire::record::ChunkIndex;
/// let index = ChunkIndex::new(3);
/// assert_eq!(index.get(), 3);
/// assert_eq!(index.checked_increment(), Some(ChunkIndex::new(4)));
/// ```
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ChunkIndex(u32);

impl ChunkIndex {
    /// Construct an index from a `u32` value.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the first valid chunk index.
    #[must_use]
    pub const fn zero() -> Self { Self(0) }

    /// Return the underlying numeric value.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }

    /// Increment the index, returning `None` on overflow.
    #[must_use]
    pub fn checked_increment(self) -> Option<Self> { self.0.checked_add(1).map(Self) }
}

impl TryFrom<usize> for ChunkIndex {
    type Error = TryFromIntError;

    fn try_from(value: usize) -> Result<Self, Self::Error> { u32::try_from(value).map(Self) }
}

impl From<ChunkIndex> for u32 {
    fn from(value: ChunkIndex) -> Self { value.0 }
}
