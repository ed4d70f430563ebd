use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use framewire_frame::{FrameKind, DEFAULT_MAX_PAYLOAD};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::hex;
use crate::output::OutputFormat;

pub mod decode;
pub mod echo;
pub mod encode;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Decode frames from wire bytes.
    Decode(DecodeArgs),
    /// Start an echo server.
    Echo(EchoArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame kind: continuation, text, binary, close, ping, pong.
    #[arg(long, short = 'k', default_value = "text")]
    pub kind: FrameKind,
    /// Payload as a UTF-8 string.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Payload as hex.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Mask the payload with a random key.
    #[arg(long)]
    pub mask: bool,
    /// Clear the final-fragment flag.
    #[arg(long)]
    pub no_fin: bool,
    /// Reserved bits (0-7).
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=7))]
    pub rsv: u8,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes as hex. Reads stdin when neither this nor --file is given.
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw wire bytes from file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Largest payload accepted, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Endpoint to bind (unix:<path>, tcp:<host:port>, or a socket path).
    pub endpoint: String,
    /// Channel config file (JSON).
    #[arg(long, value_name = "FILE", env = "FRAMEWIRE_CHANNEL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Polling interval (e.g. 5ms, 1s).
    #[arg(long, default_value = "5ms")]
    pub tick: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint to connect to.
    pub endpoint: String,
    /// Frame kind: continuation, text, binary, close, ping, pong.
    #[arg(long, short = 'k', default_value = "text")]
    pub kind: FrameKind,
    /// Payload as a UTF-8 string.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Payload as hex.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// How long to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Pick the payload from whichever of `--data`, `--hex`, `--file` was given.
pub(crate) fn resolve_payload(
    data: Option<&str>,
    hex_input: Option<&str>,
    file: Option<&Path>,
) -> CliResult<Vec<u8>> {
    if let Some(data) = data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(input) = hex_input {
        return hex::decode(input).map_err(|err| CliError::new(USAGE, format!("--hex: {err}")));
    }
    if let Some(path) = file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
