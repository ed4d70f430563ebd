use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framewire_frame::Frame;
use serde::Serialize;

use crate::hex;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A frame pulled out of a byte sequence, with where it started.
#[derive(Debug)]
pub struct DecodedFrame {
    pub offset: usize,
    pub masked: bool,
    pub frame: Frame,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'static str,
    opcode: u8,
    fin: bool,
    rsv: u8,
    payload_size: usize,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    masked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl<'a> FrameOutput<'a> {
    fn new(frame: &Frame) -> Self {
        Self {
            kind: frame.kind.name(),
            opcode: frame.kind.opcode(),
            fin: frame.fin,
            rsv: frame.rsv,
            payload_size: frame.payload.len(),
            payload: payload_preview(frame.payload.as_ref()),
            masked: None,
            offset: None,
            peer: None,
            timestamp: None,
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    kind: &'static str,
    fin: bool,
    rsv: u8,
    masked: bool,
    payload_size: usize,
    wire_size: usize,
    hex: &'a str,
}

/// Print a frame received from `peer`.
pub fn print_frame(frame: &Frame, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                peer: Some(peer),
                timestamp: Some(now_unix_seconds()),
                ..FrameOutput::new(frame)
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = frame_table(&["KIND", "FIN", "SIZE", "PEER", "PAYLOAD"]);
            table.add_row(vec![
                frame.kind.name().to_string(),
                frame.fin.to_string(),
                frame.payload.len().to_string(),
                peer.to_string(),
                payload_preview(frame.payload.as_ref()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} fin={} size={} peer={} payload={}",
                frame.kind.name(),
                frame.fin,
                frame.payload.len(),
                peer,
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => print_raw(frame.payload.as_ref()),
    }
}

/// Print the wire bytes produced for `frame`.
pub fn print_encoded(frame: &Frame, wire: &[u8], masked: bool, format: OutputFormat) {
    let hex = hex::encode(wire);
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            kind: frame.kind.name(),
            fin: frame.fin,
            rsv: frame.rsv,
            masked,
            payload_size: frame.payload.len(),
            wire_size: wire.len(),
            hex: &hex,
        }),
        OutputFormat::Table => {
            let mut table = frame_table(&["KIND", "FIN", "RSV", "MASKED", "SIZE", "WIRE", "HEX"]);
            table.add_row(vec![
                frame.kind.name().to_string(),
                frame.fin.to_string(),
                frame.rsv.to_string(),
                masked.to_string(),
                frame.payload.len().to_string(),
                wire.len().to_string(),
                hex,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} fin={} rsv={} masked={} size={} wire={} hex={}",
                frame.kind.name(),
                frame.fin,
                frame.rsv,
                masked,
                frame.payload.len(),
                wire.len(),
                hex
            );
        }
        OutputFormat::Raw => print_raw(wire),
    }
}

/// Print frames decoded from a byte sequence. JSON output is one line per frame.
pub fn print_decoded(frames: &[DecodedFrame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for decoded in frames {
                print_json(&FrameOutput {
                    masked: Some(decoded.masked),
                    offset: Some(decoded.offset),
                    ..FrameOutput::new(&decoded.frame)
                });
            }
        }
        OutputFormat::Table => {
            let mut table =
                frame_table(&["OFFSET", "KIND", "FIN", "RSV", "MASKED", "SIZE", "PAYLOAD"]);
            for decoded in frames {
                let frame = &decoded.frame;
                table.add_row(vec![
                    decoded.offset.to_string(),
                    frame.kind.name().to_string(),
                    frame.fin.to_string(),
                    frame.rsv.to_string(),
                    decoded.masked.to_string(),
                    frame.payload.len().to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for decoded in frames {
                let frame = &decoded.frame;
                println!(
                    "@{} kind={} fin={} rsv={} masked={} size={} payload={}",
                    decoded.offset,
                    frame.kind.name(),
                    frame.fin,
                    frame.rsv,
                    decoded.masked,
                    frame.payload.len(),
                    payload_preview(frame.payload.as_ref())
                );
            }
        }
        OutputFormat::Raw => {
            for decoded in frames {
                print_raw(decoded.frame.payload.as_ref());
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn frame_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_for_decoded_frame() {
        let out = FrameOutput {
            masked: Some(true),
            offset: Some(7),
            ..FrameOutput::new(&Frame::text("hi"))
        };
        let value: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["kind"], "TEXT");
        assert_eq!(value["opcode"], 1);
        assert_eq!(value["payload"], "hi");
        assert_eq!(value["offset"], 7);
        assert!(value.get("peer").is_none());
    }

    #[test]
    fn binary_payload_preview() {
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }
}
