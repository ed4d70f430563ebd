use bytes::BytesMut;
use framewire_frame::{Frame, FrameEncoder};

use crate::cmd::{resolve_payload, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(
        args.data.as_deref(),
        args.hex.as_deref(),
        args.file.as_deref(),
    )?;
    let frame = Frame::new(args.kind, payload)
        .with_fin(!args.no_fin)
        .with_rsv(args.rsv);

    let wire = encode(&frame, args.mask).map_err(|err| frame_error("encode failed", err))?;
    tracing::debug!(
        kind = frame.kind.name(),
        size = frame.payload.len(),
        wire = wire.len(),
        "encoded frame"
    );
    print_encoded(&frame, &wire, args.mask, format);
    Ok(SUCCESS)
}

fn encode(frame: &Frame, mask: bool) -> framewire_frame::Result<BytesMut> {
    let mut wire = BytesMut::with_capacity(frame.wire_size(mask));
    FrameEncoder::new(mask).encode(frame, &mut wire)?;
    Ok(wire)
}
