//! Deterministic artifacts and identifiers.

use chunkwire::record::{ArtifactId, DeviceId, OriginTimestamp};
use rstest::fixture;

/// Build an identifier from a device name and millisecond timestamp.
#[must_use]
pub fn artifact_id(device: &str, origin_ms: u64) -> ArtifactId {
    ArtifactId::new(DeviceId::new(device), OriginTimestamp::from_millis(origin_ms))
}

/// JPEG-shaped bytes of exactly `len` bytes (minimum 4).
///
/// Starts with an SOI marker and ends with an EOI marker; the body is a
/// fixed pseudo-random sequence so equal lengths give equal frames.
#[must_use]
pub fn sample_frame(len: usize) -> Vec<u8> {
    let len = len.max(4);
    let mut frame = Vec::with_capacity(len);
    frame.extend_from_slice(&[0xFF, 0xD8]);
    let mut state: u32 = 0x2545_F491;
    while frame.len() < len - 2 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        frame.push(state.to_le_bytes()[0]);
    }
    frame.extend_from_slice(&[0xFF, 0xD9]);
    frame
}

/// A 10 KiB frame, larger than one chunk at the default chunk size.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn frame() -> Vec<u8> { sample_frame(10 * 1024) }
