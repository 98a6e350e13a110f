//! Player side: opens the event channel and drives gap-free playback.
//!
//! The public surface is deliberately small: [`Session::connect`] opens the
//! channel and starts the [`engine::PlaybackEngine`] behind it, the returned
//! [`Session`] exposes a manual [`close`](Session::close), and
//! [`finished`](Session::finished) yields the session's summary. Everything
//! else on this side — frame parsing, queueing, the play loop — is driven
//! internally.
//!
//! The audio device itself sits behind the [`output::AudioOutput`]
//! capability, injected per session, so the engine can be exercised without
//! any hardware.

pub mod engine;
mod frames;
pub mod output;

pub use engine::{EngineError, EngineState, PlaybackEngine, SessionSummary};
pub use output::{AudioOutput, OutputError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Errors surfaced by [`Session`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The channel could not be opened.
    #[error("failed to open event channel: {0}")]
    Connect(#[from] reqwest::Error),
    /// The session ended on a fatal stream error.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The playback task panicked or was aborted.
    #[error("playback task failed")]
    Join,
}

/// Handle to one live playback session.
///
/// Dropping the handle without calling [`finished`](Session::finished) tears
/// the session down, the same as [`close`](Session::close).
pub struct Session {
    close: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<SessionSummary, EngineError>>,
}

impl Session {
    /// Opens the channel at `url` and starts playback through `output`.
    ///
    /// Returns once the channel is established; playback then runs in the
    /// background until the stream terminates or the session is closed.
    pub async fn connect<O>(url: &str, output: O) -> Result<Self, ClientError>
    where
        O: AudioOutput + 'static,
    {
        let response = reqwest::get(url).await?.error_for_status()?;
        let frames = frames::frame_stream(response.bytes_stream());

        let (close_tx, close_rx) = oneshot::channel();
        let engine = PlaybackEngine::new(output);
        let task = tokio::spawn(engine.run(Box::pin(frames), close_rx));

        Ok(Self {
            close: Some(close_tx),
            task,
        })
    }

    /// Requests teardown: playback stops and no further decodes happen.
    ///
    /// Idempotent; the session still has to be reaped with
    /// [`finished`](Session::finished).
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }

    /// Waits for the session to end and returns its summary.
    pub async fn finished(self) -> Result<SessionSummary, ClientError> {
        // keep the close sender alive while waiting, so dropping it doesn't
        // tear the session down mid-drain
        let Session { close: _close, task } = self;

        match task.await {
            Ok(result) => result.map_err(ClientError::Engine),
            Err(_) => Err(ClientError::Join),
        }
    }
}
