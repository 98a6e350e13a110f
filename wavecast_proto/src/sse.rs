//! Event-stream framing: all channel-level framing and splitting is done here.
//!
//! The channel is a server-sent event stream: UTF-8 text, one `data: <json>`
//! line per frame, events separated by a blank line. [`encode_frame`] produces
//! outbound events; [`EventSplitter`] reassembles inbound events from an
//! arbitrarily-chunked byte stream.

use crate::message::{Frame, FrameError};

/// Wraps an already-serialized payload in an SSE `data:` event.
#[inline(always)]
pub fn encode_event(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// Serializes a frame and wraps it in an SSE `data:` event.
#[inline]
pub fn encode_frame(frame: &Frame) -> Result<String, FrameError> {
    frame.to_json().map(|json| encode_event(&json))
}

/// Incremental splitter for an inbound event stream.
///
/// Feed raw bytes as they arrive off the transport; complete events come out
/// as the concatenation of their `data:` field lines. Comment lines and
/// fields other than `data` are ignored, as are events carrying no data.
///
/// Bytes are buffered across calls, so transport chunk boundaries may fall
/// anywhere, including inside a multi-byte UTF-8 sequence.
#[derive(Debug, Default)]
pub struct EventSplitter {
    buf: Vec<u8>,
}

impl EventSplitter {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly received bytes, returning the payloads of any events they
    /// complete, in arrival order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut payloads = Vec::new();

        while let Some(end) = find_event_boundary(&self.buf) {
            let event: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(payload) = join_data_lines(&event[..end]) {
                payloads.push(payload);
            }
        }

        payloads
    }
}

/// Returns the offset of the first `\n\n` event separator, if one is buffered.
#[inline(always)]
fn find_event_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\n\n")
}

/// Joins an event's `data:` field lines with `\n`, per the SSE grammar.
///
/// Returns `None` for events with no data field (comments, keep-alives).
fn join_data_lines(event: &[u8]) -> Option<String> {
    let mut payload = String::new();

    for line in event.split(|&byte| byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let Some(value) = line.strip_prefix(b"data:") else {
            continue;
        };
        let value = value.strip_prefix(b" ").unwrap_or(value);

        if !payload.is_empty() {
            payload.push('\n');
        }
        payload.push_str(&String::from_utf8_lossy(value));
    }

    (!payload.is_empty()).then_some(payload)
}
