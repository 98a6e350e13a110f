//! Inbound channel consumption: transport bytes → events → frames.

use bytes::Bytes;
use futures_util::{Stream, StreamExt, future, stream};
use tracing::{debug, warn};

use wavecast_proto::{Frame, sse::EventSplitter};

/// Adapts a raw transport byte stream into a stream of parsed frames.
///
/// The returned stream ends when the transport does. A transport error is
/// peer closure, not a session error: it is logged and ends the stream the
/// same way. Individual malformed frames are logged and dropped so one bad
/// event cannot take the session down.
pub(crate) fn frame_stream<B, E>(bytes: B) -> impl Stream<Item = Frame> + Send
where
    B: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    let mut splitter = EventSplitter::new();

    bytes
        .scan((), |_, result| {
            future::ready(match result {
                Ok(chunk) => Some(chunk),
                Err(e) => {
                    debug!("channel closed by peer: {e}");
                    None
                }
            })
        })
        .flat_map(move |chunk| {
            let frames: Vec<Frame> = splitter
                .feed(&chunk)
                .into_iter()
                .filter_map(|payload| match Frame::from_json(&payload) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!("dropping malformed frame: {e}");
                        None
                    }
                })
                .collect();
            stream::iter(frames)
        })
}
