//! Startup configuration.
//!
//! One flat option set, parsed once at startup and frozen into
//! [`ServerConfig`]. Nothing reads configuration ambiently; both the emitter
//! and the HTTP surface receive the struct by reference.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use wavecast_proto::AudioParams;

/// Command-line surface. No subcommands.
#[derive(Debug, clap::Parser)]
#[command(name = "wavecast-server", about = "Streams a raw PCM file over server-sent events")]
pub struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Path to the raw PCM source file.
    #[arg(long)]
    pub source: PathBuf,

    /// Bytes read and transmitted per frame.
    #[arg(long, default_value_t = NonZeroUsize::new(64 * 1024).unwrap())]
    pub chunk_size: NonZeroUsize,

    /// Sample rate of the source in Hz.
    #[arg(long, default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Bits per sample of the source.
    #[arg(long, default_value_t = 16)]
    pub bit_depth: u16,

    /// Channel count of the source.
    #[arg(long, default_value_t = 1)]
    pub channels: u16,

    /// Per-block pacing increment in milliseconds (200 approximates
    /// real-time delivery for the defaults). Omit to transmit blocks as
    /// fast as the source yields them.
    #[arg(long)]
    pub pace_ms: Option<u64>,
}

/// Immutable configuration shared by the emitter and the HTTP surface.
///
/// Constructed exactly once, at startup, from [`Cli`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP surface binds to.
    pub addr: SocketAddr,
    /// Raw PCM source file.
    pub source: PathBuf,
    /// Bytes per block.
    pub chunk_size: NonZeroUsize,
    /// Format of the source. Must match the file's actual contents; the
    /// emitter never inspects the sample bytes.
    pub params: AudioParams,
    /// `Some` selects the paced emission policy with this per-block
    /// increment; `None` selects the immediate policy.
    pub pace_increment: Option<Duration>,
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cli.port),
            source: cli.source,
            chunk_size: cli.chunk_size,
            params: AudioParams {
                sample_rate: cli.sample_rate,
                bit_depth: cli.bit_depth,
                channels: cli.channels,
            },
            pace_increment: cli.pace_ms.map(Duration::from_millis),
        }
    }
}
