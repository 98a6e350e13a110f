//! The playback engine: exactly-once, gap-free, order-preserving playback.
//!
//! One engine drives one session. Frames arrive over the channel, decoded
//! blocks wait in a strict-FIFO queue, and a single play step at a time
//! wraps the head block in a container, decodes it, and plays it. The next
//! step begins only after the previous unit's completion notification, so
//! blocks can never overlap and never leave a gap while the queue is
//! non-empty.
//!
//! The single-flight invariant is structural rather than a flag: the run
//! loop owns at most one completion receiver (`current`), and a new unit can
//! only be started by the arm that just gave the previous receiver up.

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt, future};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use wavecast_proto::{AudioParams, DataFrame, Frame, wav};

use crate::output::AudioOutput;

/// Lifecycle of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No unit in flight; the queue may still hold blocks.
    Idle,
    /// Exactly one unit is being decoded or played.
    Playing,
    /// Terminal. The channel is closed and no transition leaves this state.
    Closed,
}

/// End-of-session accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Units played to completion.
    pub played: u64,
    /// Blocks dropped by payload or container decode failures.
    pub dropped: u64,
    /// Data-frame count announced by the terminal frame, if one arrived.
    pub announced_total: Option<u64>,
}

/// Fatal session outcomes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// The emitter reported a fatal error frame. Queued and in-flight audio
    /// was abandoned.
    #[error("stream error from emitter: {0}")]
    Stream(String),
}

/// The per-session playback state machine.
pub struct PlaybackEngine<O: AudioOutput> {
    output: O,
    queue: VecDeque<Vec<u8>>,
    state: EngineState,
    /// Refreshed from every data frame; data frames carry the session
    /// format redundantly, so this is current before the first play step.
    params: AudioParams,
    played: u64,
    dropped: u64,
}

impl<O: AudioOutput> PlaybackEngine<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            queue: VecDeque::new(),
            state: EngineState::Idle,
            params: AudioParams::default(),
            played: 0,
            dropped: 0,
        }
    }

    /// Drives the session to completion.
    ///
    /// Consumes frames until a terminal frame arrives, the peer closes the
    /// channel, or `close` fires (manual teardown). An `end` frame stops
    /// consumption but lets queued and in-flight audio drain; an `error`
    /// frame and both teardown paths abandon playback immediately.
    pub async fn run<S>(
        mut self,
        mut frames: S,
        mut close: oneshot::Receiver<()>,
    ) -> Result<SessionSummary, EngineError>
    where
        S: Stream<Item = Frame> + Unpin + Send,
    {
        // the in-flight unit's completion receiver; `Some` iff Playing
        let mut current: Option<oneshot::Receiver<()>> = None;
        let mut announced_total = None;
        let mut draining = false;

        loop {
            tokio::select! {
                _ = &mut close => {
                    debug!("manual close, abandoning playback");
                    self.teardown(&mut current);
                    return Ok(self.summary(announced_total));
                }

                maybe_frame = frames.next(), if !draining => match maybe_frame {
                    Some(Frame::Data(frame)) => {
                        self.on_data(frame);
                        if self.state == EngineState::Idle {
                            self.play_step(&mut current).await;
                        }
                    }
                    Some(Frame::End { total }) => {
                        info!(total, queued = self.queue.len(), "stream ended, draining");
                        announced_total = Some(total);
                        draining = true;
                        if self.state == EngineState::Idle {
                            self.state = EngineState::Closed;
                            return Ok(self.summary(announced_total));
                        }
                    }
                    Some(Frame::Error { message }) => {
                        warn!("stream error, abandoning playback: {message}");
                        self.teardown(&mut current);
                        return Err(EngineError::Stream(message));
                    }
                    None => {
                        debug!("channel closed by peer, abandoning playback");
                        self.teardown(&mut current);
                        return Ok(self.summary(announced_total));
                    }
                },

                _ = wait_done(&mut current), if current.is_some() => {
                    self.played += 1;
                    current = None;
                    self.play_step(&mut current).await;
                    if draining && self.state == EngineState::Idle {
                        self.state = EngineState::Closed;
                        return Ok(self.summary(announced_total));
                    }
                }
            }
        }
    }

    /// Handles one data frame: decode the payload, refresh the session
    /// format, enqueue. A bad payload drops this block only.
    fn on_data(&mut self, frame: DataFrame) {
        match frame.decode_payload() {
            Ok(raw) => {
                self.params = frame.config.params;
                debug!(id = frame.id, len = raw.len(), "block queued");
                self.queue.push_back(raw);
            }
            Err(e) => {
                self.dropped += 1;
                warn!(id = frame.id, "dropping block with bad payload: {e}");
            }
        }
    }

    /// Advances playback: pops queue entries until one decodes and starts,
    /// or the queue runs dry. Only ever invoked with no unit in flight.
    async fn play_step(&mut self, current: &mut Option<oneshot::Receiver<()>>) {
        while let Some(pcm) = self.queue.pop_front() {
            let container = wav::wav_from_pcm(&pcm, &self.params);

            match self.output.decode(container).await {
                Ok(unit) => {
                    *current = Some(self.output.start(unit));
                    self.state = EngineState::Playing;
                    return;
                }
                Err(e) => {
                    // a bad block must not stall the queue
                    self.dropped += 1;
                    warn!("skipping undecodable block: {e}");
                }
            }
        }

        self.state = EngineState::Idle;
    }

    /// Abandons queued and in-flight audio and closes the session.
    fn teardown(&mut self, current: &mut Option<oneshot::Receiver<()>>) {
        self.queue.clear();
        *current = None;
        self.output.halt();
        self.state = EngineState::Closed;
    }

    fn summary(&self, announced_total: Option<u64>) -> SessionSummary {
        SessionSummary {
            played: self.played,
            dropped: self.dropped,
            announced_total,
        }
    }
}

/// Awaits the in-flight completion receiver.
///
/// A dropped sender counts as completed; the output gave the unit up either
/// way. Guarded by `current.is_some()` in the select, so the pending branch
/// is never reached.
async fn wait_done(current: &mut Option<oneshot::Receiver<()>>) {
    match current {
        Some(done) => {
            let _ = done.await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::stream;

    use crate::output::OutputError;

    /// Marker byte that makes a block fail container decoding.
    const POISON: u8 = 0xee;

    /// Scripted stand-in for the decode/play capability.
    ///
    /// Blocks are identified by their first payload byte. Completion
    /// latency is `latency_unit * first_byte`, so tests can invert
    /// completion order relative to queue order.
    struct FakeOutput {
        started: Arc<Mutex<Vec<u8>>>,
        decodes: Arc<AtomicUsize>,
        halted: Arc<AtomicBool>,
        active: Arc<AtomicBool>,
        latency_unit: Duration,
    }

    impl FakeOutput {
        fn new(latency_unit: Duration) -> Self {
            Self {
                started: Arc::default(),
                decodes: Arc::default(),
                halted: Arc::default(),
                active: Arc::default(),
                latency_unit,
            }
        }
    }

    #[async_trait]
    impl AudioOutput for FakeOutput {
        type Unit = Vec<u8>;

        async fn decode(&mut self, container: Vec<u8>) -> Result<Self::Unit, OutputError> {
            self.decodes.fetch_add(1, Ordering::AcqRel);
            let (_params, pcm) = wav::split_pcm(&container)?;
            if pcm.first() == Some(&POISON) {
                return Err(OutputError::Decode("poisoned block".into()));
            }
            Ok(pcm.to_vec())
        }

        fn start(&mut self, unit: Self::Unit) -> oneshot::Receiver<()> {
            assert!(
                !self.active.swap(true, Ordering::AcqRel),
                "single-flight violated: unit started while another was playing"
            );
            self.started.lock().unwrap().push(unit[0]);

            let (done_tx, done_rx) = oneshot::channel();
            let latency = self.latency_unit * unit[0] as u32;
            let active = Arc::clone(&self.active);

            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                active.store(false, Ordering::Release);
                let _ = done_tx.send(());
            });

            done_rx
        }

        fn halt(&mut self) {
            self.halted.store(true, Ordering::Release);
            self.active.store(false, Ordering::Release);
        }
    }

    fn data_frame(id: u64, first_byte: u8) -> Frame {
        Frame::Data(DataFrame::from_block(
            id,
            &[first_byte, 0, 0, 0],
            AudioParams::speech(),
        ))
    }

    fn never_close() -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        std::mem::forget(tx);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn plays_in_receipt_order_despite_inverted_latencies() {
        let output = FakeOutput::new(Duration::from_millis(10));
        let started = Arc::clone(&output.started);

        // block 3 finishes fastest, block 1 slowest; order must still hold
        let frames = stream::iter(vec![
            data_frame(1, 3),
            data_frame(2, 2),
            data_frame(3, 1),
            Frame::End { total: 3 },
        ]);

        let summary = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await
            .unwrap();

        assert_eq!(*started.lock().unwrap(), [3, 2, 1]);
        assert_eq!(summary.played, 3);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.announced_total, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_skips_block_without_stalling() {
        let output = FakeOutput::new(Duration::from_millis(1));
        let started = Arc::clone(&output.started);

        let frames = stream::iter(vec![
            data_frame(1, 1),
            data_frame(2, POISON),
            data_frame(3, 2),
            Frame::End { total: 3 },
        ]);

        let summary = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await
            .unwrap();

        assert_eq!(*started.lock().unwrap(), [1, 2]);
        assert_eq!(summary.played, 2);
        assert_eq!(summary.dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_payload_drops_only_that_block() {
        let output = FakeOutput::new(Duration::from_millis(1));
        let started = Arc::clone(&output.started);

        let mut corrupt = match data_frame(2, 9) {
            Frame::Data(frame) => frame,
            _ => unreachable!(),
        };
        corrupt.data = "@@not base64@@".into();

        let frames = stream::iter(vec![
            data_frame(1, 1),
            Frame::Data(corrupt),
            data_frame(3, 2),
            Frame::End { total: 3 },
        ]);

        let summary = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await
            .unwrap();

        assert_eq!(*started.lock().unwrap(), [1, 2]);
        assert_eq!(summary.played, 2);
        assert_eq!(summary.dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn end_drains_queued_and_in_flight_audio() {
        let output = FakeOutput::new(Duration::from_millis(50));
        let started = Arc::clone(&output.started);
        let halted = Arc::clone(&output.halted);

        // End arrives while block 1 is still playing and 2, 3 are queued
        let frames = stream::iter(vec![
            data_frame(1, 1),
            data_frame(2, 2),
            data_frame(3, 3),
            Frame::End { total: 3 },
        ]);

        let summary = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await
            .unwrap();

        assert_eq!(*started.lock().unwrap(), [1, 2, 3]);
        assert_eq!(summary.played, 3);
        assert!(!halted.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn error_abandons_queued_audio() {
        let output = FakeOutput::new(Duration::from_secs(60));
        let started = Arc::clone(&output.started);
        let halted = Arc::clone(&output.halted);
        let decodes = Arc::clone(&output.decodes);

        let frames = stream::iter(vec![
            data_frame(1, 1),
            data_frame(2, 2),
            Frame::Error {
                message: "read failed".into(),
            },
        ]);

        let result = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await;

        assert_eq!(result, Err(EngineError::Stream("read failed".into())));
        // block 1 started; block 2 was abandoned before any decode attempt
        assert_eq!(*started.lock().unwrap(), [1]);
        assert_eq!(decodes.load(Ordering::Acquire), 1);
        assert!(halted.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_close_halts_and_stops_decoding() {
        let output = FakeOutput::new(Duration::from_secs(60));
        let halted = Arc::clone(&output.halted);
        let decodes = Arc::clone(&output.decodes);

        // the channel stays open forever; only close() ends the session
        let frames = stream::iter(vec![data_frame(1, 1), data_frame(2, 2)])
            .chain(stream::pending());

        let (close_tx, close_rx) = oneshot::channel();
        let session = tokio::spawn(PlaybackEngine::new(output).run(Box::pin(frames), close_rx));

        tokio::time::sleep(Duration::from_millis(5)).await;
        close_tx.send(()).unwrap();

        let summary = session.await.unwrap().unwrap();
        assert_eq!(summary.played, 0);
        assert!(halted.load(Ordering::Acquire));
        let decoded_at_close = decodes.load(Ordering::Acquire);

        // nothing decodes after teardown
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(decodes.load(Ordering::Acquire), decoded_at_close);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_closure_without_terminal_frame_tears_down() {
        let output = FakeOutput::new(Duration::from_secs(60));
        let halted = Arc::clone(&output.halted);

        // stream ends with no End/Error frame
        let frames = stream::iter(vec![data_frame(1, 1)]);

        let summary = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await
            .unwrap();

        assert_eq!(summary.played, 0);
        assert_eq!(summary.announced_total, None);
        assert!(halted.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn end_with_empty_queue_closes_immediately() {
        let output = FakeOutput::new(Duration::from_millis(1));

        let frames = stream::iter(vec![Frame::End { total: 0 }]);
        let summary = PlaybackEngine::new(output)
            .run(Box::pin(frames), never_close())
            .await
            .unwrap();

        assert_eq!(summary.played, 0);
        assert_eq!(summary.announced_total, Some(0));
    }
}
