//! # Networking Error Types

use thiserror::Error;

/// Errors decoding a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before the frame did.
    #[error("truncated packet: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Unrecognized type byte.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// Fire request with a mode byte outside the known modes.
    #[error("unknown fire mode: {0}")]
    UnknownFireMode(u8),

    /// Bytes left over after a complete frame.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),

    /// A valid packet arrived on a channel that does not carry it.
    #[error("packet type {0} not carried by this channel")]
    WrongChannel(u8),

    /// NaN or infinite value where a real number is required.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Errors moving frames through a channel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The other endpoint is gone.
    #[error("channel disconnected")]
    Disconnected,

    /// The frame could not be encoded.
    #[error("packet did not fit the frame buffer")]
    Encode,
}

/// Result type for decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
