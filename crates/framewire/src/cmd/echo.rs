use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use framewire_channel::{
    ChannelConfig, ChannelError, Connection, FlushOutcome, FramedTransport, MessageTransport,
    Pipeline,
};
use framewire_frame::{Frame, FrameConfig, FrameKind};
use framewire_transport::{Endpoint, WireListener, WireStream};

use crate::cmd::{parse_duration, EchoArgs};
use crate::exit::{channel_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::OutputFormat;

type EchoConnection = Connection<FramedTransport<WireStream, WireStream>, EchoPipeline>;

/// Turns each inbound frame into the reply the echo server owes for it.
#[derive(Debug, Default)]
struct EchoPipeline {
    replies: VecDeque<Frame>,
    close_after_replies: bool,
}

impl EchoPipeline {
    fn take_replies(&mut self) -> VecDeque<Frame> {
        std::mem::take(&mut self.replies)
    }
}

impl Pipeline<Frame> for EchoPipeline {
    fn message_received(&mut self, frame: Frame) {
        tracing::info!(
            kind = frame.kind.name(),
            fin = frame.fin,
            size = frame.payload.len(),
            "frame received"
        );
        match frame.kind {
            FrameKind::Ping => self.replies.push_back(Frame::pong(frame.payload)),
            FrameKind::Pong => {}
            FrameKind::Close => {
                self.replies.push_back(Frame::close(frame.payload));
                self.close_after_replies = true;
            }
            FrameKind::Text | FrameKind::Binary | FrameKind::Continuation => {
                self.replies.push_back(frame)
            }
        }
    }

    fn read_suspended(&mut self) {
        tracing::trace!("read suspended at batch limit");
    }

    fn exception_caught(&mut self, cause: ChannelError) {
        tracing::warn!(error = %cause, io = cause.is_io(), "read error");
    }

    fn channel_closed(&mut self) {
        self.replies.clear();
    }
}

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let endpoint =
        Endpoint::parse(&args.endpoint).map_err(|err| transport_error("invalid endpoint", err))?;
    let tick = parse_duration(&args.tick)?;
    let config = match &args.config {
        Some(path) => ChannelConfig::from_file(path).map_err(|err| {
            channel_error(&format!("failed loading {}", path.display()), err)
        })?,
        None => ChannelConfig::default(),
    };

    let listener =
        WireListener::bind(&endpoint).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut connections: Vec<EchoConnection> = Vec::new();
    while running.load(Ordering::SeqCst) {
        while let Some(stream) = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?
        {
            let peer = stream.peer_label();
            match open_connection(stream, &config) {
                Ok(conn) => {
                    tracing::info!(peer = %peer, channel = conn.id(), "peer connected");
                    connections.push(conn);
                }
                Err(err) => tracing::warn!(peer = %peer, error = %err, "connection setup failed"),
            }
        }

        for conn in &mut connections {
            service(conn);
        }
        connections.retain(|conn| {
            if !conn.is_open() {
                tracing::info!(channel = conn.id(), "peer disconnected");
            }
            conn.is_open()
        });

        thread::sleep(tick);
    }

    for conn in &mut connections {
        conn.shutdown();
    }
    Ok(SUCCESS)
}

fn open_connection(
    stream: WireStream,
    config: &ChannelConfig,
) -> Result<EchoConnection, ChannelError> {
    let transport = FramedTransport::from_stream(stream, FrameConfig::default())?;
    let mut conn = Connection::new(transport, EchoPipeline::default(), config.clone())?;
    conn.register()?;
    Ok(conn)
}

/// One polling pass: read, queue replies, flush, and close after a
/// close handshake once its reply is out.
fn service<T>(conn: &mut Connection<T, EchoPipeline>)
where
    T: MessageTransport<Message = Frame>,
{
    if conn.wants_read() {
        conn.read();
    } else if !conn.config().auto_read {
        conn.begin_read();
    }

    for reply in conn.pipeline_mut().take_replies() {
        if conn.write(reply).is_err() {
            break;
        }
    }

    if conn.pending_outbound() > 0 {
        match conn.flush() {
            Ok(FlushOutcome::Complete) => {}
            Ok(FlushOutcome::Stalled { pending }) => {
                tracing::debug!(channel = conn.id(), pending, "flush stalled");
            }
            Err(err) => tracing::warn!(channel = conn.id(), error = %err, "echo write failed"),
        }
    }

    if conn.pipeline().close_after_replies && conn.pending_outbound() == 0 {
        conn.close();
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
