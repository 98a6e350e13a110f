//! The chunk emitter: sequential block reads, optional pacing, deterministic
//! completion.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use wavecast_proto::{AudioParams, DataFrame, Frame};

use crate::config::ServerConfig;

/// How long to keep the channel open after the terminal frame, so the
/// transport gets a chance to flush before teardown.
const END_FLUSH_GRACE: Duration = Duration::from_millis(100);

/// Errors fatal to an emitter session.
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("source read failed: {0}")]
    SourceRead(#[from] std::io::Error),
}

/// A contiguous slice of the source signal.
///
/// Indices are 1-based, assigned at read time, and strictly increasing.
/// Blocks are immutable once produced and discarded after framing.
#[derive(Debug)]
pub struct Block {
    pub index: u64,
    pub bytes: Vec<u8>,
}

/// Sequential fixed-size reader over the raw source.
///
/// Owned exclusively by one emitter session for its whole lifetime.
pub struct BlockReader {
    file: tokio::fs::File,
    chunk_size: NonZeroUsize,
    next_index: u64,
}

impl BlockReader {
    pub async fn open(path: &Path, chunk_size: NonZeroUsize) -> Result<Self, EmitterError> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EmitterError::SourceNotFound(path.display().to_string())
            } else {
                EmitterError::SourceRead(e)
            }
        })?;

        Ok(Self {
            file,
            chunk_size,
            next_index: 0,
        })
    }

    /// Reads the next block, or `None` once the source is exhausted.
    ///
    /// Every block but the last is exactly `chunk_size` bytes long.
    pub async fn next_block(&mut self) -> Result<Option<Block>, EmitterError> {
        let mut bytes = vec![0u8; self.chunk_size.get()];
        let mut filled = 0;

        while filled < bytes.len() {
            let n = self.file.read(&mut bytes[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        bytes.truncate(filled);
        self.next_index += 1;

        Ok(Some(Block {
            index: self.next_index,
            bytes,
        }))
    }
}

/// Tracks outstanding paced transmissions and arbitrates the terminal frame.
///
/// Every completion path (the read loop on source exhaustion, each paced
/// task on finishing) calls [`try_complete`](Self::try_complete); the
/// compare-exchange on the fired flag guarantees a single winner, so the
/// terminal frame is emitted exactly once no matter how transmissions
/// interleave.
///
/// Invariant: `pending` reaches zero if and only if every scheduled block
/// has finished transmitting (successfully or not).
#[derive(Debug, Default)]
pub struct Completion {
    pending: AtomicUsize,
    total: AtomicU64,
    exhausted: AtomicBool,
    halted: AtomicBool,
    fired: AtomicBool,
}

impl Completion {
    /// Records a newly scheduled transmission.
    pub fn begin(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Records a finished transmission. Must be called exactly once per
    /// [`begin`](Self::begin), on every path out of the task.
    pub fn finish(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Marks the source fully read, recording the final block count.
    pub fn exhaust(&self, total: u64) {
        self.total.store(total, Ordering::Release);
        self.exhausted.store(true, Ordering::Release);
    }

    /// Permanently suppresses the terminal frame and any queued
    /// transmissions (source error or sink closure).
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// The block count recorded by [`exhaust`](Self::exhaust).
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Returns `true` exactly once: for the first caller to observe the
    /// source exhausted with no transmission outstanding and the session
    /// not halted.
    pub fn try_complete(&self) -> bool {
        if !self.exhausted.load(Ordering::Acquire)
            || self.pending.load(Ordering::Acquire) != 0
            || self.is_halted()
        {
            return false;
        }

        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One emitter session.
///
/// Reads the configured source to exhaustion, transmitting one frame per
/// block into `sink` under the configured policy, then exactly one terminal
/// frame. Dropping the sink's receiver halts the session silently.
pub struct Emitter {
    config: Arc<ServerConfig>,
    sink: mpsc::Sender<Frame>,
}

impl Emitter {
    pub fn new(config: Arc<ServerConfig>, sink: mpsc::Sender<Frame>) -> Self {
        Self { config, sink }
    }

    /// Runs the session to completion.
    ///
    /// All failure reporting is in-band: fatal errors become an `error`
    /// frame, per-block failures are logged and skipped, and a closed sink
    /// ends the session without any frame.
    pub async fn run(self) {
        let mut reader =
            match BlockReader::open(&self.config.source, self.config.chunk_size).await {
                Ok(reader) => reader,
                Err(e) => {
                    self.report(e).await;
                    return;
                }
            };

        match self.config.pace_increment {
            Some(step) => self.run_paced(&mut reader, step).await,
            None => self.run_immediate(&mut reader).await,
        }
    }

    /// Immediate policy: encode and transmit each block as the source
    /// yields it. Wire order equals block order.
    async fn run_immediate(&self, reader: &mut BlockReader) {
        let mut total = 0u64;

        loop {
            match reader.next_block().await {
                Ok(Some(block)) => {
                    total = block.index;
                    let frame = frame_block(&block, self.config.params);
                    if self.sink.send(frame).await.is_err() {
                        debug!(index = block.index, "sink closed, halting session");
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.report(e).await;
                    return;
                }
            }
        }

        info!(total, "source exhausted, ending stream");
        let _ = self.sink.send(Frame::End { total }).await;
    }

    /// Paced policy: each block's transmission runs as its own task after a
    /// delay that grows by `step` per block read. The terminal frame is
    /// gated on the [`Completion`] tracker, never on wire order.
    async fn run_paced(&self, reader: &mut BlockReader, step: Duration) {
        let completion = Arc::new(Completion::default());
        let mut delay = Duration::ZERO;
        let mut total = 0u64;

        loop {
            if completion.is_halted() || self.sink.is_closed() {
                debug!("sink closed, halting session");
                return;
            }

            let block = match reader.next_block().await {
                Ok(Some(block)) => block,
                Ok(None) => break,
                Err(e) => {
                    // suppress queued transmissions before the error frame
                    // goes out, so nothing follows it
                    completion.halt();
                    self.report(e).await;
                    return;
                }
            };

            total = block.index;
            delay += step;
            completion.begin();

            let sink = self.sink.clone();
            let params = self.config.params;
            let completion = Arc::clone(&completion);

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                if !completion.is_halted() {
                    let frame = frame_block(&block, params);
                    if sink.send(frame).await.is_err() {
                        completion.halt();
                    }
                }

                completion.finish();
                finish_session(&completion, &sink).await;
            });
        }

        completion.exhaust(total);
        finish_session(&completion, &self.sink).await;
    }

    /// Reports a fatal session error in-band, exactly once.
    async fn report(&self, e: EmitterError) {
        error!("emitter session failed: {e}");
        let _ = self
            .sink
            .send(Frame::Error {
                message: e.to_string(),
            })
            .await;
    }
}

/// Encodes one block into its wire frame.
///
/// Infallible today (Base64 encoding cannot fail), but kept as the single
/// choke point where a per-block encode failure would be contained.
fn frame_block(block: &Block, params: AudioParams) -> Frame {
    Frame::Data(DataFrame::from_block(block.index, &block.bytes, params))
}

/// The single check-and-fire step shared by every completion path.
///
/// Whichever caller wins the [`Completion::try_complete`] race emits the
/// terminal frame, then holds the channel open briefly so the transport can
/// flush it.
async fn finish_session(completion: &Completion, sink: &mpsc::Sender<Frame>) {
    if !completion.try_complete() {
        return;
    }

    let total = completion.total();
    info!(total, "all paced blocks transmitted, ending stream");

    if sink.send(Frame::End { total }).await.is_err() {
        warn!("sink closed before the terminal frame could be flushed");
        return;
    }

    tokio::time::sleep(END_FLUSH_GRACE).await;
}
