//! All protocol frame types exchanged over the event channel.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::format::AudioParams;

/// Fixed human-readable note carried in every data frame's `desc` field.
pub const PAYLOAD_DESC: &str =
    "base64-encoded little-endian PCM; encoded size exceeds the raw block size by ~33%";

/// One frame of an outbound session stream.
///
/// A session consists of zero or more [`Data`](Frame::Data) frames followed
/// by exactly one terminal frame: [`End`](Frame::End) on clean completion,
/// [`Error`](Frame::Error) on fatal failure. The terminal frame is always
/// the last frame of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One block of Base64-encoded raw samples.
    Data(DataFrame),
    /// Clean end of session.
    ///
    /// `total` is the number of data frames the session emitted.
    End { total: u64 },
    /// Fatal session failure. No frame ever follows it.
    Error { message: String },
}

impl Frame {
    /// Whether this frame terminates its session.
    #[inline(always)]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Frame::End { .. } | Frame::Error { .. })
    }

    /// Serializes this frame to its JSON wire shape.
    #[inline]
    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(&WireFrameRef::from(self)).map_err(FrameError::Json)
    }

    /// Parses a frame from its JSON wire shape.
    #[inline]
    pub fn from_json(payload: &str) -> Result<Self, FrameError> {
        serde_json::from_str::<WireFrame>(payload)
            .map(Into::into)
            .map_err(FrameError::Json)
    }
}

/// The payload frame for a single raw block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFrame {
    /// 1-based block index, assigned at read time.
    ///
    /// Strictly increasing per session, but not guaranteed to match wire
    /// order when the emitter paces transmission asynchronously; receivers
    /// must trust this field rather than arrival order for attribution.
    pub id: u64,
    /// Base64-encoded raw sample bytes.
    pub data: String,
    /// Length of the encoded payload in bytes.
    pub byte_size: u64,
    /// Session format plus this block's raw length.
    pub config: BlockConfig,
}

impl DataFrame {
    /// Encodes one raw block into its wire frame.
    pub fn from_block(id: u64, raw: &[u8], params: AudioParams) -> Self {
        let data = BASE64.encode(raw);
        Self {
            id,
            byte_size: data.len() as u64,
            data,
            config: BlockConfig {
                params,
                chunk_size: raw.len() as u64,
                desc: PAYLOAD_DESC.to_owned(),
            },
        }
    }

    /// Decodes the Base64 payload back into raw sample bytes.
    #[inline]
    pub fn decode_payload(&self) -> Result<Vec<u8>, FrameError> {
        BASE64.decode(&self.data).map_err(FrameError::Payload)
    }
}

/// Per-frame copy of the session format, plus the raw length of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
    /// The session's fixed audio parameters.
    #[serde(flatten)]
    pub params: AudioParams,
    /// Raw (pre-encoding) length of this block in bytes.
    pub chunk_size: u64,
    /// Human-readable note about the payload encoding.
    pub desc: String,
}

/// Error returned when a frame cannot be (de)serialized.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is not valid JSON, or does not match any known shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The data payload is not valid Base64.
    #[error("payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),
}

// Wire representations. On the wire, control frames are tagged with a `type`
// field while data frames are bare objects; this pair of serde enums
// reproduces that shape exactly. Callers never see these types: they are
// used only at the (de)serialization boundary in `Frame::{to_json,from_json}`
// and converted to and from the public `Frame` automatically.

#[derive(Serialize)]
#[serde(untagged)]
enum WireFrameRef<'a> {
    Control(ControlFrameRef<'a>),
    Data(&'a DataFrame),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrameRef<'a> {
    End { total: u64 },
    Error { message: &'a str },
}

impl<'a> From<&'a Frame> for WireFrameRef<'a> {
    #[inline(always)]
    fn from(frame: &'a Frame) -> Self {
        match frame {
            Frame::Data(data) => Self::Data(data),
            Frame::End { total } => Self::Control(ControlFrameRef::End { total: *total }),
            Frame::Error { message } => Self::Control(ControlFrameRef::Error { message }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireFrame {
    Control(ControlFrame),
    Data(DataFrame),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    End { total: u64 },
    Error { message: String },
}

impl From<WireFrame> for Frame {
    #[inline(always)]
    fn from(wire: WireFrame) -> Self {
        match wire {
            WireFrame::Data(data) => Self::Data(data),
            WireFrame::Control(ControlFrame::End { total }) => Self::End { total },
            WireFrame::Control(ControlFrame::Error { message }) => Self::Error { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_wire_shape() {
        let frame = Frame::Data(DataFrame::from_block(3, b"\x01\x02\x03\x04", AudioParams::speech()));
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();

        assert_eq!(json["id"], 3);
        assert_eq!(json["data"], BASE64.encode(b"\x01\x02\x03\x04"));
        assert_eq!(json["byteSize"], 8);
        assert_eq!(json["config"]["sampleRate"], 16_000);
        assert_eq!(json["config"]["bitDepth"], 16);
        assert_eq!(json["config"]["channels"], 1);
        assert_eq!(json["config"]["chunkSize"], 4);
        assert!(json["config"]["desc"].is_string());
        // data frames are bare objects, not type-tagged
        assert!(json.get("type").is_none());
    }

    #[test]
    fn terminal_frame_wire_shapes() {
        let end = Frame::End { total: 5 };
        let json: serde_json::Value = serde_json::from_str(&end.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["total"], 5);

        let error = Frame::Error {
            message: "read failed".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&error.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "read failed");
    }

    #[test]
    fn round_trips_through_json() {
        let frames = [
            Frame::Data(DataFrame::from_block(1, &[0u8; 16], AudioParams::speech())),
            Frame::End { total: 1 },
            Frame::Error {
                message: "boom".into(),
            },
        ];
        for frame in frames {
            let parsed = Frame::from_json(&frame.to_json().unwrap()).unwrap();
            assert_eq!(parsed, frame);
        }
    }

    #[test]
    fn payload_round_trip_and_rejection() {
        let raw: Vec<u8> = (0..=255).collect();
        let frame = DataFrame::from_block(1, &raw, AudioParams::speech());
        assert_eq!(frame.decode_payload().unwrap(), raw);

        let mut bad = frame.clone();
        bad.data = "not*base64!".into();
        assert!(bad.decode_payload().is_err());
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(Frame::from_json(r#"{"type":"bogus"}"#).is_err());
        assert!(Frame::from_json("[]").is_err());
    }
}
