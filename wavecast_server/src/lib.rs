//! Emitter side: turns a raw PCM file into a framed, optionally paced event
//! stream.
//!
//! The pipeline is deliberately thin: a sequential [`emitter::BlockReader`]
//! segments the source into fixed-size blocks, the [`emitter::Emitter`]
//! frames and transmits them under one of two policies, and the [`http`]
//! module exposes the resulting frame stream as a server-sent event endpoint.
//!
//! ## Emission policies
//!
//! - **Immediate**: every block is encoded and pushed as soon as the source
//!   yields it. Wire order matches block order.
//! - **Paced**: each block's transmission is delayed by a little more than
//!   the previous one's, simulating real-time delivery. Transmissions run as
//!   independent tasks, so wire order is not guaranteed; block indices are
//!   assigned at read time and travel inside each frame.
//!
//! Under either policy a session ends with exactly one terminal frame: `end`
//! once every block has been both read and transmitted, or `error` if the
//! source fails mid-read. The paced policy gates the terminal frame on an
//! explicit [`emitter::Completion`] tracker rather than on wire order.

pub mod config;
pub mod emitter;
pub mod http;

pub use config::{Cli, ServerConfig};
