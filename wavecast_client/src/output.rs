//! The audio output capability boundary.
//!
//! The playback engine never touches a device directly; it needs exactly two
//! primitives from its environment: decode a self-describing container into a
//! playable unit, and start a unit while learning of its completion through a
//! notification. [`AudioOutput`] captures that pair as a session-scoped
//! resource: implementations acquire their device or context when
//! constructed, serve exactly one session, and release everything in
//! [`halt`](AudioOutput::halt) or on drop.

use async_trait::async_trait;
use tokio::sync::oneshot;

/// Errors from the decode half of the capability.
///
/// Always contained to the block being decoded; never fatal to a session.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("container rejected: {0}")]
    Container(#[from] wavecast_proto::wav::ContainerError),
    #[error("decoder failed: {0}")]
    Decode(String),
}

/// Session-scoped audio decode and playback capability.
#[async_trait]
pub trait AudioOutput: Send {
    /// A decoded, playable unit.
    type Unit: Send;

    /// Decodes one container into a playable unit.
    async fn decode(&mut self, container: Vec<u8>) -> Result<Self::Unit, OutputError>;

    /// Starts playback of a unit.
    ///
    /// The returned receiver resolves once the unit has finished playing.
    /// The engine guarantees at most one unit is in flight at a time.
    fn start(&mut self, unit: Self::Unit) -> oneshot::Receiver<()>;

    /// Stops any in-flight playback and releases device resources.
    fn halt(&mut self);
}

#[cfg(feature = "rodio-out")]
pub use rodio_out::RodioOutput;

/// Playback through the default audio device.
#[cfg(feature = "rodio-out")]
mod rodio_out {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rodio::buffer::SamplesBuffer;
    use tokio::sync::oneshot;

    use wavecast_proto::wav;

    use super::{AudioOutput, OutputError};

    /// [`AudioOutput`] backed by a rodio sink on the default output device.
    ///
    /// Only 16-bit containers are supported; anything else is rejected at
    /// decode time (and therefore skipped by the engine, not fatal).
    pub struct RodioOutput {
        // keeps the device stream alive for the session
        _stream: rodio::OutputStream,
        sink: Arc<rodio::Sink>,
    }

    impl RodioOutput {
        /// Opens the default output device for one session.
        pub fn new() -> Result<Self, OutputError> {
            let stream = rodio::OutputStreamBuilder::open_default_stream()
                .map_err(|e| OutputError::Decode(e.to_string()))?;
            let sink = Arc::new(rodio::Sink::connect_new(stream.mixer()));

            Ok(Self {
                _stream: stream,
                sink,
            })
        }
    }

    #[async_trait]
    impl AudioOutput for RodioOutput {
        type Unit = SamplesBuffer;

        async fn decode(&mut self, container: Vec<u8>) -> Result<Self::Unit, OutputError> {
            let (params, pcm) = wav::split_pcm(&container)?;

            if params.bit_depth != 16 {
                return Err(OutputError::Decode(format!(
                    "unsupported bit depth {}",
                    params.bit_depth
                )));
            }

            let samples: Vec<f32> = pcm
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
                .collect();

            Ok(SamplesBuffer::new(
                params.channels,
                params.sample_rate,
                samples,
            ))
        }

        fn start(&mut self, unit: Self::Unit) -> oneshot::Receiver<()> {
            let (done_tx, done_rx) = oneshot::channel();

            self.sink.append(unit);

            let sink = Arc::clone(&self.sink);
            tokio::task::spawn_blocking(move || {
                sink.sleep_until_end();
                let _ = done_tx.send(());
            });

            done_rx
        }

        fn halt(&mut self) {
            self.sink.stop();
        }
    }
}
