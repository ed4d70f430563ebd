use std::fs;
use std::io::Read;

use bytes::BytesMut;
use framewire_frame::{decode_frame, opcode, FrameError, FrameHeader};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::hex;
use crate::output::{print_decoded, DecodedFrame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = read_input(&args)?;
    let (frames, fault) = decode_all(&raw, args.max_payload);
    print_decoded(&frames, format);
    match fault {
        Some(err) => Err(err),
        None => Ok(SUCCESS),
    }
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(input) = &args.hex {
        return hex::decode(input).map_err(|err| CliError::new(USAGE, format!("hex input: {err}")));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let mut raw = Vec::new();
    std::io::stdin()
        .read_to_end(&mut raw)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(raw)
}

/// Decode every complete frame in `raw`. Stops at the first fault or at a
/// trailing partial frame, returning what was decoded before it.
fn decode_all(raw: &[u8], max_payload: usize) -> (Vec<DecodedFrame>, Option<CliError>) {
    let mut buf = BytesMut::from(raw);
    let mut frames = Vec::new();

    loop {
        let offset = raw.len() - buf.len();
        let masked = FrameHeader::parse(&buf).is_some_and(|header| header.is_masked());
        match decode_frame(&mut buf, max_payload) {
            Ok(Some(frame)) => frames.push(DecodedFrame {
                offset,
                masked,
                frame,
            }),
            Ok(None) if buf.is_empty() => return (frames, None),
            Ok(None) => {
                let err = CliError::new(
                    DATA_INVALID,
                    format!(
                        "incomplete frame at byte {offset}: {} trailing bytes",
                        buf.len()
                    ),
                );
                return (frames, Some(err));
            }
            Err(err) => {
                let context = match &err {
                    FrameError::UnsupportedFrameCategory(code) if opcode::is_reserved(*code) => {
                        format!("decode failed at byte {offset} ({})", describe_reserved(*code))
                    }
                    _ => format!("decode failed at byte {offset}"),
                };
                return (frames, Some(frame_error(&context, err)));
            }
        }
    }
}

fn describe_reserved(code: u8) -> String {
    let range = if opcode::is_control(code) {
        "control"
    } else {
        "data"
    };
    format!("reserved {range} opcode 0x{code:X}")
}
