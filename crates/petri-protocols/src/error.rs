//! Error types for petri-protocols.

use thiserror::Error;

/// Result type for petri-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the wire.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed or reset the stream.
    #[error("channel closed")]
    ChannelClosed,

    /// The opcode is not part of the protocol.
    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),

    /// The opcode is valid but not in the current state.
    #[error("unexpected opcode {opcode} in state {state}")]
    UnexpectedOpcode { state: String, opcode: i32 },

    /// A payload had the wrong size for its opcode.
    #[error("malformed {what} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Metadata failed validation before it was sent.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// A frame announced a payload beyond the accepted limit.
    #[error("frame of {0} bytes exceeds the payload limit")]
    FrameTooLarge(usize),
}

impl Error {
    /// True when the error means the peer went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ChannelClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
