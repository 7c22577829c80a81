//! Metric helpers for `chunkwire`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

use crate::record::RecordKind;

/// Counter of records accepted by the bus on the sending side.
pub const RECORDS_SENT: &str = "chunkwire_records_sent_total";
/// Counter of records that failed to publish.
pub const PUBLISH_FAILURES: &str = "chunkwire_publish_failures_total";
/// Counter of records received by the reassembler.
pub const RECORDS_RECEIVED: &str = "chunkwire_records_received_total";
/// Counter of records dropped without mutating a transfer.
pub const RECORDS_DROPPED: &str = "chunkwire_records_dropped_total";
/// Counter of transfers reaching a terminal state.
pub const TRANSFERS_FINISHED: &str = "chunkwire_transfers_total";
/// Gauge of transfers currently collecting chunks.
pub const TRANSFERS_PENDING: &str = "chunkwire_transfers_pending";

/// Terminal state of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Verified and handed to the sink.
    Completed,
    /// Verification or persistence failed.
    Failed,
    /// Evicted by the timeout sweep.
    Evicted,
}

impl TransferOutcome {
    /// Label value used for this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Evicted => "evicted",
        }
    }
}

/// Record a record accepted by the bus.
pub fn inc_records_sent(kind: RecordKind) {
    #[cfg(feature = "metrics")]
    metrics::counter!(RECORDS_SENT, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a publish failure.
pub fn inc_publish_failures() {
    #[cfg(feature = "metrics")]
    metrics::counter!(PUBLISH_FAILURES).increment(1);
}

/// Record an inbound record of `kind`.
pub fn inc_records_received(kind: RecordKind) {
    #[cfg(feature = "metrics")]
    metrics::counter!(RECORDS_RECEIVED, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a dropped record, labelled with a short reason.
pub fn inc_records_dropped(reason: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!(RECORDS_DROPPED, "reason" => reason).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = reason;
}

/// Record a transfer reaching `outcome`.
pub fn inc_transfers(outcome: TransferOutcome) {
    #[cfg(feature = "metrics")]
    metrics::counter!(TRANSFERS_FINISHED, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Publish the number of collecting transfers.
pub fn set_pending(count: usize) {
    #[cfg(feature = "metrics")]
    #[expect(
        clippy::cast_precision_loss,
        reason = "gauge values are f64; pending counts are small"
    )]
    metrics::gauge!(TRANSFERS_PENDING).set(count as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

/// Install a Prometheus exporter listening on `addr`.
///
/// # Errors
///
/// Returns the exporter's build error if the listener cannot be installed.
#[cfg(feature = "metrics")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
