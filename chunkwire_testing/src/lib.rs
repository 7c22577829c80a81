//! Test support for `chunkwire`.
//!
//! Provides deterministic artifacts, in-memory sinks and publishers, helpers
//! for replaying records onto a bus in a chosen order and a serialised handle
//! on the global log capture.
//!
//! ```rust
//! use chunkwire_testing::{MemorySink, sample_frame};
//!
//! let frame = sample_frame(512);
//! assert_eq!(&frame[..2], &[0xFF, 0xD8]);
//! let sink = MemorySink::new();
//! assert!(sink.stored().is_empty());
//! ```

pub mod artifacts;
pub mod logging;
pub mod publishers;
pub mod sinks;

pub use artifacts::{artifact_id, frame, sample_frame};
pub use logging::{LoggerHandle, logger};
pub use publishers::{RecordingPublisher, publish_in_order};
pub use sinks::{FailingSink, MemorySink};
