//! Error types for packet recognition and control encoding

use thiserror::Error;

/// Errors that can occur while recognizing packets
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame exceeds the protocol's length limit
    #[error("frame too long: {len} bytes (limit {limit})")]
    Oversize { len: usize, limit: usize },

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

/// Errors from decoding a backslash-escaped control string
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscapeError {
    /// Escape sequence cut off at the end of the input
    #[error("truncated escape sequence at offset {0}")]
    Truncated(usize),

    /// `\x` followed by something other than two hex digits
    #[error("invalid hex escape at offset {0}")]
    InvalidHex(usize),

    /// Unrecognized escape character
    #[error("unknown escape '\\{ch}' at offset {offset}")]
    Unknown { ch: char, offset: usize },

    /// Nothing left after decoding
    #[error("empty control string")]
    Empty,
}
