//! Wire protocol for streaming raw PCM audio over a text-only event channel.
//!
//! This crate defines the message model shared by the wavecast emitter and
//! player, together with the codecs both endpoints need at the channel
//! boundary.
//!
//! ## Roles
//!
//! Each endpoint acts as either an **emitter** or a **player**:
//!
//! - **Emitters** segment a finite raw sample source into fixed-size blocks
//!   and push one frame per block down a long-lived one-way channel.
//! - **Players** consume frames, reassemble the raw blocks, and drive
//!   playback on consumer hardware.
//!
//! ## Frame model
//!
//! A session is a sequence of [`Frame::Data`] frames followed by exactly one
//! terminal frame, either [`Frame::End`] (clean completion) or
//! [`Frame::Error`] (fatal session failure). See the [`message`] module for
//! the complete definitions and the exact JSON wire shapes.
//!
//! Because the channel is text-only, block payloads travel Base64-encoded,
//! and every data frame redundantly carries the session's [`AudioParams`] so
//! a player can begin decoding without any handshake.
//!
//! ## Channel framing
//!
//! Frames are serialized to JSON and wrapped in `data: <json>\n\n` events on
//! a server-sent event stream. The [`sse`] module owns both directions of
//! that framing.
//!
//! ## Containers
//!
//! Players hand their audio backends self-describing containers rather than
//! bare sample bytes. The [`wav`] module builds and splits the canonical
//! 44-byte RIFF/WAVE container for uncompressed PCM.

pub mod format;
pub mod message;
pub mod sse;
pub mod wav;

pub use format::AudioParams;
pub use message::{BlockConfig, DataFrame, Frame, FrameError};
