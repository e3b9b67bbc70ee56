//! Configuration and limits for WebSocket connections.

use std::time::Duration;

/// Resource limits for a single connection.
///
/// Every limit bounds an allocation that would otherwise be sized by an
/// untrusted length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame payload in bytes.
    ///
    /// Default: 1 MB
    pub max_frame_size: usize,

    /// Maximum size of a complete message after reassembly.
    ///
    /// Default: 4 MB
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the upgrade request in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 1024 * 1024,
            max_message_size: 4 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate a declared frame size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a reassembled message size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a fragment count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate accumulated handshake size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Fragment size for outgoing messages, in bytes.
    ///
    /// Data messages larger than this are split across multiple frames.
    ///
    /// Default: 16 KB
    pub fragment_size: usize,

    /// Accept unmasked client frames.
    ///
    /// RFC 6455 requires clients to mask all frames; enabling this violates
    /// the RFC but is useful with non-compliant test peers.
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,

    /// Read buffer size in bytes.
    ///
    /// Default: 8 KB
    pub read_buffer_size: usize,

    /// Write buffer size in bytes.
    ///
    /// Default: 8 KB
    pub write_buffer_size: usize,

    /// How long the liveness probe waits for a matching Pong before the
    /// peer is treated as unresponsive and closed.
    ///
    /// Default: 10 seconds
    pub ping_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: 16 * 1024,
            accept_unmasked_frames: false,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            ping_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Set the liveness-probe timeout.
    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Accept unmasked client frames (non-compliant, testing only).
    #[must_use]
    pub fn with_accept_unmasked_frames(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }
}
