use std::thread;
use std::time::{Duration, Instant};

use framewire_channel::{
    ChannelConfig, Connection, FlushOutcome, FramedTransport, MessageTransport, RecordingPipeline,
};
use framewire_frame::{Frame, FrameConfig};
use framewire_transport::{Endpoint, WireStream};

use crate::cmd::{parse_duration, resolve_payload, SendArgs};
use crate::exit::{channel_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

type ClientConnection<T> = Connection<T, RecordingPipeline<Frame>>;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint =
        Endpoint::parse(&args.endpoint).map_err(|err| transport_error("invalid endpoint", err))?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(
        args.data.as_deref(),
        args.hex.as_deref(),
        args.file.as_deref(),
    )?;

    let stream =
        WireStream::connect(&endpoint).map_err(|err| transport_error("connect failed", err))?;
    let peer = stream.peer_label();
    let frames = FrameConfig {
        mask_payload: true,
        ..FrameConfig::default()
    };
    let transport = FramedTransport::from_stream(stream, frames)
        .map_err(|err| channel_error("connect failed", err))?;
    let mut conn = Connection::new(transport, RecordingPipeline::new(), ChannelConfig::default())
        .map_err(|err| channel_error("connect failed", err))?;
    conn.register()
        .map_err(|err| channel_error("connect failed", err))?;

    let frame = Frame::new(args.kind, payload);
    tracing::debug!(
        peer = %peer,
        kind = frame.kind.name(),
        size = frame.payload.len(),
        "sending frame"
    );
    conn.write(frame)
        .map_err(|err| channel_error("send failed", err))?;
    flush_within(&mut conn, wait_timeout)?;

    if args.wait {
        let reply = wait_for_reply(&mut conn, wait_timeout)?;
        print_frame(&reply, &peer, format);
    }

    conn.close();
    Ok(SUCCESS)
}

fn flush_within<T>(conn: &mut ClientConnection<T>, timeout: Duration) -> CliResult<()>
where
    T: MessageTransport<Message = Frame>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match conn
            .flush()
            .map_err(|err| channel_error("send failed", err))?
        {
            FlushOutcome::Complete => return Ok(()),
            FlushOutcome::Stalled { pending } => {
                if Instant::now() >= deadline {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("send failed: {pending} frame(s) still queued after {timeout:?}"),
                    ));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn wait_for_reply<T>(conn: &mut ClientConnection<T>, timeout: Duration) -> CliResult<Frame>
where
    T: MessageTransport<Message = Frame>,
{
    let deadline = Instant::now() + timeout;
    loop {
        conn.read();
        if let Some(err) = conn.pipeline_mut().take_errors().into_iter().next() {
            return Err(channel_error("receive failed", err));
        }
        if let Some(frame) = conn.pipeline_mut().pop_received() {
            return Ok(frame);
        }
        if !conn.is_open() {
            return Err(CliError::new(
                FAILURE,
                "receive failed: connection closed by peer",
            ));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("receive failed: no reply within {timeout:?}"),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use framewire_channel::{ChannelError, LoopbackTransport};

    use super::*;
    use crate::exit::DATA_INVALID;

    fn loopback() -> ClientConnection<LoopbackTransport<Frame>> {
        let mut conn = Connection::new(
            LoopbackTransport::new(),
            RecordingPipeline::new(),
            ChannelConfig::default(),
        )
        .unwrap();
        conn.register().unwrap();
        conn
    }

    #[test]
    fn reply_is_returned() {
        let mut conn = loopback();
        conn.transport_mut().push_inbound(Frame::text("pong"));
        let reply = wait_for_reply(&mut conn, Duration::from_millis(50)).unwrap();
        assert_eq!(reply, Frame::text("pong"));
    }

    #[test]
    fn silence_times_out() {
        let mut conn = loopback();
        let err = wait_for_reply(&mut conn, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn peer_close_fails() {
        let mut conn = loopback();
        conn.transport_mut().set_eof();
        let err = wait_for_reply(&mut conn, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn read_error_is_reported() {
        use framewire_channel::Pipeline;

        let mut conn = loopback();
        conn.pipeline_mut()
            .exception_caught(ChannelError::decode("garbled"));
        let err = wait_for_reply(&mut conn, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn flush_writes_queued_frame() {
        let mut conn = loopback();
        conn.write(Frame::text("out")).unwrap();
        flush_within(&mut conn, Duration::from_millis(50)).unwrap();
        assert_eq!(conn.transport_mut().pop_outbound(), Some(Frame::text("out")));
    }
}
