//! Transport-safe text encoding of artifact bytes.
//!
//! Artifacts are rendered as standard base64 before chunking. Some embedded
//! encoders strip the trailing `=` padding, so decoding re-pads once before
//! giving up.

use base64::{DecodeError, Engine as _, engine::general_purpose::STANDARD};

/// Encode `bytes` as padded standard base64.
#[must_use]
pub fn encode(bytes: &[u8]) -> String { STANDARD.encode(bytes) }

/// Length of the padded base64 rendering of `raw_len` bytes.
///
/// # Examples
///
/// ```
/// use chunkwire::encoding::encoded_len;
/// assert_eq!(encoded_len(0), 0);
/// assert_eq!(encoded_len(1), 4);
/// assert_eq!(encoded_len(3), 4);
/// assert_eq!(encoded_len(4), 8);
/// ```
#[must_use]
pub const fn encoded_len(raw_len: usize) -> usize { raw_len.div_ceil(3).saturating_mul(4) }

/// Decode base64 text, tolerating missing trailing padding.
///
/// The text is decoded as-is first. When that fails and the length is not a
/// multiple of four, `=` characters are appended and decoding is retried
/// exactly once.
///
/// # Errors
///
/// Returns the [`DecodeError`] from the final attempt.
///
/// # Examples
///
/// ```
/// use chunkwire::encoding::decode_lenient;
/// assert_eq!(decode_lenient("aGk=").unwrap(), b"hi");
/// assert_eq!(decode_lenient("aGk").unwrap(), b"hi");
/// ```
pub fn decode_lenient(text: &str) -> Result<Vec<u8>, DecodeError> {
    match STANDARD.decode(text) {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            let remainder = text.len() % 4;
            if remainder == 0 {
                return Err(err);
            }
            let mut padded = String::with_capacity(text.len() + 4 - remainder);
            padded.push_str(text);
            padded.extend(std::iter::repeat_n('=', 4 - remainder));
            STANDARD.decode(padded)
        }
    }
}
