//! Integrity digests carried by header, chunk and completion records.
//!
//! A [`Digest`] is the lowercase hex rendering of a SHA-256 hash. Artifact
//! digests cover the raw artifact bytes; chunk digests cover the encoded text
//! slice exactly as it travels on the bus.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Hex-encoded SHA-256 checksum.
///
/// # Examples
///
/// ```
/// use chunkwire::Digest;
/// let digest = Digest::of(b"abc");
/// assert!(digest.matches(b"abc"));
/// assert!(!digest.matches(b"abd"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Compute the digest of `bytes`.
    #[must_use]
    pub fn of(bytes: impl AsRef<[u8]>) -> Self { Self(hex::encode(Sha256::digest(bytes.as_ref()))) }

    /// Wrap a hex string received from a peer.
    ///
    /// The value is not validated here; a malformed digest simply never
    /// matches.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

    /// Report whether `bytes` hash to this digest.
    ///
    /// Hex case is ignored so senders emitting uppercase digits still verify.
    #[must_use]
    pub fn matches(&self, bytes: impl AsRef<[u8]>) -> bool {
        self.0.eq_ignore_ascii_case(&Self::of(bytes).0)
    }

    /// Borrow the hex text.
    #[must_use]
    pub fn as_str(&self) -> &str { self.0.as_str() }

    /// Leading characters used in log lines.
    #[must_use]
    pub fn short(&self) -> &str { self.0.get(..8).unwrap_or(self.0.as_str()) }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}
