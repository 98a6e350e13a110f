//! Plays a wavecast stream through the default audio device.
//!
//! Usage: cargo run --example play --features rodio-out -- [url]

use wavecast_client::{Session, output::RodioOutput};

#[tokio::main]
async fn main() {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:3000/api/pcm-stream".to_owned());

    let output = RodioOutput::new().expect("no audio output device");
    let session = Session::connect(&url, output).await.expect("connect failed");

    let summary = session.finished().await.expect("session failed");
    println!(
        "played {} blocks ({} dropped, {:?} announced)",
        summary.played, summary.dropped, summary.announced_total
    );
}
