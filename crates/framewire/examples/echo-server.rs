//! Minimal echo server: accepts peers on a unix socket and echoes data
//! frames back through a polled `Connection`.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/framewire-echo-<pid>/echo.sock \
//!     --data hello --wait --wait-timeout 3s

use std::fs;
use std::thread;
use std::time::Duration;

use framewire::channel::{ChannelConfig, Connection, FramedTransport, RecordingPipeline};
use framewire::frame::{Frame, FrameConfig, FrameKind};
use framewire::transport::{Endpoint, WireListener, WireStream};

type Peer = Connection<FramedTransport<WireStream, WireStream>, RecordingPipeline<Frame>>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("framewire-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let endpoint = Endpoint::Unix(sock_dir.join("echo.sock"));

    let listener = WireListener::bind(&endpoint)?;
    eprintln!("Listening on {endpoint}");

    let mut peers: Vec<Peer> = Vec::new();
    loop {
        while let Some(stream) = listener.accept()? {
            let transport = FramedTransport::from_stream(stream, FrameConfig::default())?;
            let mut conn =
                Connection::new(transport, RecordingPipeline::new(), ChannelConfig::default())?;
            conn.register()?;
            eprintln!("Peer connected: channel {}", conn.id());
            peers.push(conn);
        }

        for conn in &mut peers {
            conn.read();
            for err in conn.pipeline_mut().take_errors() {
                eprintln!("Read error on channel {}: {err}", conn.id());
            }
            while let Some(frame) = conn.pipeline_mut().pop_received() {
                eprintln!(
                    "Received {} {} bytes on channel {}",
                    frame.kind.name(),
                    frame.payload.len(),
                    conn.id()
                );
                let reply = match frame.kind {
                    FrameKind::Ping => Frame::pong(frame.payload),
                    FrameKind::Pong => continue,
                    _ => frame,
                };
                conn.write(reply)?;
            }
            if conn.pending_outbound() > 0 {
                conn.flush()?;
            }
        }

        peers.retain(|conn| {
            if !conn.is_open() {
                eprintln!("Peer disconnected: channel {}", conn.id());
            }
            conn.is_open()
        });

        thread::sleep(Duration::from_millis(5));
    }
}
