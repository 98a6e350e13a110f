//! The broadcast surface: an axum router exposing the PCM event stream.
//!
//! One endpoint does the work: `GET /api/pcm-stream` opens a session, spawns
//! an emitter for it, and streams its frames back as server-sent events. The
//! root path serves a small index page describing the stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures::{future, stream::StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use wavecast_proto::{Frame, sse};

use crate::config::ServerConfig;
use crate::emitter::Emitter;

/// Frames buffered between the emitter and the transport before the
/// emitter's sends start applying backpressure.
const FRAME_BUFFER: usize = 32;

/// Builds the router for the given configuration.
pub fn router(config: Arc<ServerConfig>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/pcm-stream", get(stream_pcm))
        .with_state(config)
}

/// Handles `GET /api/pcm-stream`.
///
/// Validates the source, then returns a long-lived event stream carrying one
/// session. The body ends right after the terminal frame; dropping the
/// connection early halts the emitter through the closed channel.
async fn stream_pcm(State(config): State<Arc<ServerConfig>>) -> Response {
    if tokio::fs::metadata(&config.source).await.is_err() {
        warn!(source = %config.source.display(), "rejecting session, source not found");
        return (
            StatusCode::NOT_FOUND,
            format!("PCM source not found: {}", config.source.display()),
        )
            .into_response();
    }

    info!(source = %config.source.display(), "session opened, starting emitter");

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(Emitter::new(Arc::clone(&config), tx).run());

    let stream = ReceiverStream::new(rx)
        // close the body at the terminal frame so nothing can follow it
        .scan(false, |ended, frame: Frame| {
            if *ended {
                return future::ready(None);
            }
            *ended = frame.is_terminal();
            future::ready(Some(frame))
        })
        .filter_map(|frame| {
            let event = match sse::encode_frame(&frame) {
                Ok(event) => Some(Ok::<_, Infallible>(Bytes::from(event))),
                Err(e) => {
                    warn!("skipping unencodable frame: {e}");
                    None
                }
            };
            future::ready(event)
        });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Handles `GET /`: a minimal index describing the stream endpoint.
async fn index(State(config): State<Arc<ServerConfig>>) -> Html<String> {
    Html(format!(
        "<h1>wavecast PCM stream</h1>\
         <p>Endpoint: <a href=\"/api/pcm-stream\">/api/pcm-stream</a></p>\
         <ul>\
         <li>sample rate: {} Hz</li>\
         <li>bit depth: {} bit</li>\
         <li>channels: {}</li>\
         <li>block size: {} bytes</li>\
         </ul>",
        config.params.sample_rate,
        config.params.bit_depth,
        config.params.channels,
        config.chunk_size,
    ))
}
