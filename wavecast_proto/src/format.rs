//! Audio stream format definitions.

use serde::{Deserialize, Serialize};

/// A complete description of a raw sample stream.
///
/// All samples are assumed to be packed (no unused bytes), little-endian,
/// interleaved, uncompressed linear PCM. The parameters are fixed for the
/// lifetime of a session; they are carried redundantly on every data frame
/// so receivers never need a separate handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParams {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample. Must be a multiple of 8.
    pub bit_depth: u16,
    /// Interleaved channel count.
    pub channels: u16,
}

impl Default for AudioParams {
    #[inline(always)]
    fn default() -> Self {
        Self::speech()
    }
}

impl AudioParams {
    /// Returns the default format:
    ///
    /// 16 kHz, 16-bit, mono.
    #[inline(always)]
    pub const fn speech() -> Self {
        Self {
            sample_rate: 16_000,
            bit_depth: 16,
            channels: 1,
        }
    }

    /// Size of one interleaved frame in bytes: `channels * bit_depth / 8`.
    #[inline(always)]
    pub const fn block_align(&self) -> u16 {
        self.channels * (self.bit_depth / 8)
    }

    /// Bytes consumed per second of playback:
    /// `sample_rate * channels * bit_depth / 8`.
    #[inline(always)]
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}
