//! Error types for the WebSocket engine.
//!
//! The taxonomy follows the connection lifecycle: incomplete input is not an
//! error condition for the caller (retry after more bytes), protocol
//! violations are answered with a Close frame, transport failures end the
//! connection outright, and registry lookups report failure instead of
//! panicking across the boundary.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a completed text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Declared frame size exceeds the configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reassembled message size exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket upgrade request.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Upgrade request grew past the configured maximum without terminating.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes accumulated so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(String),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (RFC 6455 section 5.1 violation).
    #[error("Client frame must be masked")]
    UnmaskedFrame,

    /// Reserved bits set without a negotiated extension (there are none).
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data; retry after more input arrives.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Registry has no connection under the given identifier.
    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),

    /// Operation requires an open connection.
    #[error("Connection not open")]
    NotOpen,
}

impl Error {
    /// Whether this error is a peer protocol violation, i.e. one the engine
    /// answers with a Close frame before moving to `Closing`.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFrame(_)
                | Error::ProtocolViolation(_)
                | Error::InvalidUtf8
                | Error::FrameTooLarge { .. }
                | Error::MessageTooLarge { .. }
                | Error::TooManyFragments { .. }
                | Error::ReservedOpcode(_)
                | Error::FragmentedControlFrame
                | Error::ControlFrameTooLarge(_)
                | Error::UnmaskedFrame
                | Error::ReservedBitsSet
                | Error::InvalidOpcode(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 2_000_000,
            max: 1_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 2000000 bytes (max: 1000000)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert!(matches!(ws_err, Error::Io(_)));
    }

    #[test]
    fn test_protocol_error_classification() {
        assert!(Error::UnmaskedFrame.is_protocol_error());
        assert!(Error::ReservedBitsSet.is_protocol_error());
        assert!(Error::FrameTooLarge { size: 2, max: 1 }.is_protocol_error());
        assert!(!Error::Io("reset".into()).is_protocol_error());
        assert!(!Error::IncompleteFrame { needed: 4 }.is_protocol_error());
        assert!(!Error::ConnectionClosed(None).is_protocol_error());
    }
}
