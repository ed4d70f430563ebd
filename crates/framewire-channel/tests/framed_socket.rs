//! Connections over real sockets, driven by a polling loop.

use std::time::{Duration, Instant};

use framewire_channel::{
    ChannelConfig, ChannelError, Connection, FlushOutcome, FramedTransport, RecordingPipeline,
    StopReason,
};
use framewire_frame::{Frame, FrameConfig};
use framewire_transport::{Endpoint, WireListener, WireStream};

type FrameConnection =
    Connection<FramedTransport<WireStream, WireStream>, RecordingPipeline<Frame>>;

fn pair(config: ChannelConfig) -> (FrameConnection, FrameConnection) {
    let listener = WireListener::bind(&Endpoint::parse("tcp:127.0.0.1:0").unwrap()).unwrap();
    let client_stream = WireStream::connect(&listener.local_endpoint()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let server_stream = loop {
        if let Some(stream) = listener.accept().unwrap() {
            break stream;
        }
        assert!(Instant::now() < deadline, "accept timed out");
        std::thread::sleep(Duration::from_millis(1));
    };

    let client_frames = FrameConfig {
        mask_payload: true,
        ..FrameConfig::default()
    };
    let mut client = Connection::new(
        FramedTransport::from_stream(client_stream, client_frames).unwrap(),
        RecordingPipeline::new(),
        config.clone(),
    )
    .unwrap();
    let mut server = Connection::new(
        FramedTransport::from_stream(server_stream, FrameConfig::default()).unwrap(),
        RecordingPipeline::new(),
        config,
    )
    .unwrap();
    client.register().unwrap();
    server.register().unwrap();
    (client, server)
}

/// Poll `conn` until `done` holds or five seconds pass.
fn pump(conn: &mut FrameConnection, mut done: impl FnMut(&FrameConnection) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(conn) {
        assert!(Instant::now() < deadline, "timed out waiting on connection");
        if conn.wants_read() {
            conn.read();
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn flush_fully(conn: &mut FrameConnection) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while let FlushOutcome::Stalled { .. } = conn.flush().unwrap() {
        assert!(Instant::now() < deadline, "flush never completed");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn frames_cross_the_wire_in_order() {
    let (mut client, mut server) = pair(ChannelConfig::default());

    client.write(Frame::text("one")).unwrap();
    client.write(Frame::binary(vec![0xAB; 70_000])).unwrap();
    client.write(Frame::ping("are you there")).unwrap();

    // the large frame may not fit in the socket buffers, so read while flushing
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.pending_outbound() > 0 || server.pipeline().received_len() < 3 {
        assert!(Instant::now() < deadline, "transfer timed out");
        client.flush().unwrap();
        server.read();
        std::thread::sleep(Duration::from_millis(1));
    }
    let got: Vec<Frame> = std::iter::from_fn(|| server.pipeline_mut().pop_received()).collect();
    assert_eq!(got[0], Frame::text("one"));
    assert_eq!(got[1].payload.len(), 70_000);
    assert_eq!(got[2], Frame::ping("are you there"));

    server.write_and_flush(Frame::pong("are you there")).unwrap();
    pump(&mut client, |c| c.pipeline().received_len() == 1);
    assert_eq!(
        client.pipeline_mut().pop_received(),
        Some(Frame::pong("are you there"))
    );
}

#[test]
fn small_read_limit_suspends_between_batches() {
    let (mut client, mut server) = pair(ChannelConfig::default().with_max_messages_per_read(2));

    for i in 0..5u8 {
        client.write(Frame::binary(vec![i])).unwrap();
    }
    flush_fully(&mut client);
    std::thread::sleep(Duration::from_millis(50));

    pump(&mut server, |c| c.pipeline().received_len() == 5);
    assert!(server.pipeline().suspensions() >= 2);
    let payloads: Vec<u8> = server.pipeline().received().map(|f| f.payload[0]).collect();
    assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
}

#[test]
fn peer_close_closes_connection() {
    let (mut client, mut server) = pair(ChannelConfig::default());

    assert!(client.close());
    pump(&mut server, |c| !c.is_open());
    assert!(server.pipeline().is_closed());
    assert!(matches!(
        server.write(Frame::text("late")),
        Err(ChannelError::Closed)
    ));
}

#[test]
fn oversized_ping_fails_without_disturbing_queue() {
    let (mut client, mut server) = pair(ChannelConfig::default());

    client.write(Frame::text("before")).unwrap();
    client.write(Frame::ping(vec![0u8; 126])).unwrap();
    client.write(Frame::text("after")).unwrap();

    let err = client.flush().unwrap_err();
    assert!(!err.is_io());
    assert!(client.is_open());
    flush_fully(&mut client);

    pump(&mut server, |c| c.pipeline().received_len() == 2);
    assert_eq!(
        server.pipeline_mut().pop_received(),
        Some(Frame::text("before"))
    );
    assert_eq!(
        server.pipeline_mut().pop_received(),
        Some(Frame::text("after"))
    );
}

#[test]
fn auto_read_off_reads_one_burst_per_arming() {
    let (mut client, mut server) = pair(ChannelConfig::default().with_auto_read(false));

    client.write(Frame::text("a")).unwrap();
    client.write(Frame::text("b")).unwrap();
    flush_fully(&mut client);

    let read_burst = |conn: &mut FrameConnection| {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            conn.begin_read();
            let summary = conn.read();
            assert!(!conn.wants_read());
            if summary.delivered > 0 {
                return summary;
            }
            assert!(Instant::now() < deadline, "no data arrived");
            std::thread::sleep(Duration::from_millis(1));
        }
    };

    let first = read_burst(&mut server);
    assert_eq!(first.delivered, 1);
    assert_eq!(first.stop, StopReason::SingleBurst);
    let second = read_burst(&mut server);
    assert_eq!(second.delivered, 1);

    let got: Vec<Frame> = std::iter::from_fn(|| server.pipeline_mut().pop_received()).collect();
    assert_eq!(got, vec![Frame::text("a"), Frame::text("b")]);
    assert_eq!(server.pipeline().suspensions(), 2);
}
