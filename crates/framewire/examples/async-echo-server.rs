//! Echo server on tokio, framing TCP streams with `WebSocketCodec`.
//!
//! Run with:
//!   cargo run --example async-echo-server --features async -- 127.0.0.1:9001
//!
//! In another terminal:
//!   cargo run --features cli -- send tcp:127.0.0.1:9001 --kind ping --data hi --wait

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use framewire::frame::{Frame, FrameKind, WebSocketCodec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9001".to_string());
    let listener = TcpListener::bind(&addr).await?;
    eprintln!("Listening on tcp:{}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        eprintln!("Peer connected: {peer}");
        tokio::spawn(async move {
            if let Err(e) = echo(stream).await {
                eprintln!("Peer {peer} failed: {e}");
            }
            eprintln!("Peer disconnected: {peer}");
        });
    }
}

async fn echo(stream: TcpStream) -> framewire::frame::Result<()> {
    let mut framed = Framed::new(stream, WebSocketCodec::server());

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        eprintln!("Received {} {} bytes", frame.kind.name(), frame.payload.len());
        match frame.kind {
            FrameKind::Ping => framed.send(Frame::pong(frame.payload)).await?,
            FrameKind::Pong => {}
            FrameKind::Close => {
                framed.send(Frame::close(frame.payload)).await?;
                break;
            }
            _ => framed.send(frame).await?,
        }
    }
    Ok(())
}
