//! Error types for the message codec.

use thiserror::Error;

/// Errors raised while reading or writing protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer ended before a field could be read.
    #[error("Unexpected end of data: expected {expected} bytes, got {actual}")]
    UnexpectedEof { expected: usize, actual: usize },

    /// An enumerated field carried a value outside its known set.
    #[error("Invalid {kind} value: 0x{value:X}")]
    InvalidEnumValue { kind: &'static str, value: u32 },

    /// The leading opcode does not belong to the message being read.
    #[error("Opcode mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    OpcodeMismatch { expected: u32, actual: u32 },

    /// A blob fragment header is inconsistent.
    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    /// A transport packet could not be parsed.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Two message types were registered under the same name.
    #[error("Duplicate message type: {0}")]
    DuplicateMessageType(String),
}

impl ProtocolError {
    /// Shorthand for a length check failure.
    pub fn eof(expected: usize, actual: usize) -> Self {
        ProtocolError::UnexpectedEof { expected, actual }
    }
}
