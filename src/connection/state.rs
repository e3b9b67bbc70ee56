use std::fmt;

/// Connection lifecycle state.
///
/// Transitions move strictly forward: `Handshaking` to `Open` when the
/// upgrade response is sent, `Open` to `Closing` when either side starts the
/// close exchange, and `Closing` to `Closed` when the exchange completes or
/// the stream ends. A failed handshake jumps straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for the HTTP upgrade exchange to complete.
    #[default]
    Handshaking,
    /// Upgrade accepted; data and control frames flow freely.
    Open,
    /// A close frame has been sent or received; draining until the
    /// exchange finishes.
    Closing,
    /// Terminal. The underlying stream is no longer usable.
    Closed,
}

impl ConnectionState {
    /// Whether the connection still has work to do.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Whether application data may be sent.
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether incoming frames should still be read.
    #[must_use]
    pub const fn can_receive(&self) -> bool {
        matches!(self, Self::Open | Self::Closing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}
