//! Command line interface for the `chunkwire` loopback binary.
//!
//! The binary fragments files onto an in-process bus and reassembles them
//! into an output directory, exercising both halves of the protocol end to
//! end.

use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf};

use clap::Parser;

/// Command line arguments for the `chunkwire` binary.
#[derive(Debug, Parser)]
#[command(
    name = "chunkwire",
    version,
    about = "Send artifacts through a chunked pub/sub transfer and reassemble them"
)]
pub struct Cli {
    /// Files to transfer, one artifact each.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving reassembled artifacts.
    #[arg(short, long, default_value = "received_images")]
    pub output_dir: PathBuf,

    /// Device identifier stamped on every record.
    #[arg(short, long, default_value = "cam-01")]
    pub device_id: String,

    /// Base topic; records go to `<base>/header`, `<base>/chunk` and
    /// `<base>/completion`.
    #[arg(long, default_value = "esp32/camera")]
    pub base_topic: String,

    /// Encoded characters per chunk.
    #[arg(long, default_value = "3072")]
    pub chunk_size: NonZeroUsize,

    /// Seconds before an incomplete transfer is evicted.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Seconds between eviction sweeps.
    #[arg(long, default_value_t = 10)]
    pub sweep_interval_secs: u64,

    /// Largest payload the bus accepts, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub max_payload: usize,

    /// Chunks published per second; 0 disables pacing.
    #[arg(long, default_value_t = 0)]
    pub publish_rate: usize,

    /// Address for the Prometheus exporter.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
