//! End-to-end checks of the HTTP surface against a live listener.

use std::future::IntoFuture;
use std::io::Write;
use std::num::NonZeroUsize;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;

use wavecast_proto::{Frame, sse::EventSplitter};
use wavecast_server::{Cli, ServerConfig, http};

async fn spawn_server(config: ServerConfig) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, http::router(Arc::new(config))).into_future());
    format!("http://{addr}")
}

fn config_for(source: &std::path::Path, chunk_size: usize) -> ServerConfig {
    let mut cli = Cli::parse_from(["wavecast-server", "--source", "unused"]);
    cli.source = source.to_path_buf();
    cli.chunk_size = NonZeroUsize::new(chunk_size).unwrap();
    ServerConfig::from_cli(cli)
}

#[tokio::test]
async fn streams_five_blocks_and_a_terminal_frame() {
    let mut source = tempfile::NamedTempFile::new().unwrap();
    source.write_all(&vec![0x5au8; 320_000]).unwrap();
    source.flush().unwrap();

    let base = spawn_server(config_for(source.path(), 65_536)).await;
    let response = reqwest::get(format!("{base}/api/pcm-stream")).await.unwrap();

    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["access-control-allow-origin"], "*");

    let mut splitter = EventSplitter::new();
    let mut frames = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        for payload in splitter.feed(&chunk.unwrap()) {
            frames.push(Frame::from_json(&payload).unwrap());
        }
    }

    assert_eq!(frames.len(), 6);
    for (i, frame) in frames[..5].iter().enumerate() {
        match frame {
            Frame::Data(data) => {
                assert_eq!(data.id, i as u64 + 1);
                assert_eq!(data.config.params.sample_rate, 16_000);
            }
            other => panic!("expected data frame, got {other:?}"),
        }
    }
    assert_eq!(frames[5], Frame::End { total: 5 });
}

#[tokio::test]
async fn missing_source_is_a_plain_404() {
    let base = spawn_server(config_for(std::path::Path::new("/no/such/file.pcm"), 1_024)).await;
    let response = reqwest::get(format!("{base}/api/pcm-stream")).await.unwrap();

    assert_eq!(response.status(), 404);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/plain"));
    assert!(response.text().await.unwrap().contains("/no/such/file.pcm"));
}

#[tokio::test]
async fn index_page_describes_the_stream() {
    let source = tempfile::NamedTempFile::new().unwrap();
    let base = spawn_server(config_for(source.path(), 1_024)).await;

    let body = reqwest::get(base).await.unwrap().text().await.unwrap();
    assert!(body.contains("/api/pcm-stream"));
    assert!(body.contains("16000"));
}
