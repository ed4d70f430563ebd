//! Opcode values.
//!
//! Opcodes 0x0-0x7 are data frames, 0x8-0xF are control frames. Only six
//! are assigned; the remainder are reserved and rejected by the decoder.

/// Continuation of a fragmented message.
pub const CONTINUATION: u8 = 0x0;

/// UTF-8 text data.
pub const TEXT: u8 = 0x1;

/// Binary data.
pub const BINARY: u8 = 0x2;

/// Connection close.
pub const CLOSE: u8 = 0x8;

/// Ping.
pub const PING: u8 = 0x9;

/// Pong.
pub const PONG: u8 = 0xA;

/// Returns a human-readable name for an opcode.
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        CONTINUATION => "CONTINUATION",
        TEXT => "TEXT",
        BINARY => "BINARY",
        CLOSE => "CLOSE",
        PING => "PING",
        PONG => "PONG",
        0x3..=0x7 => "RESERVED-DATA",
        0xB..=0xF => "RESERVED-CONTROL",
        _ => "INVALID",
    }
}

/// Returns true if the opcode falls in the control range.
pub fn is_control(opcode: u8) -> bool {
    opcode & 0x08 != 0
}

/// Returns true if the opcode is a 4-bit value with no assigned meaning.
pub fn is_reserved(opcode: u8) -> bool {
    matches!(opcode, 0x3..=0x7 | 0xB..=0xF)
}
