//! # wscast - Minimal RFC 6455 WebSocket Server
//!
//! `wscast` is a small, strict WebSocket server library built directly on
//! the RFC 6455 wire format.
//!
//! ## Features
//!
//! - **Explicit frame codec** with extended lengths and client masking
//! - **HTTP upgrade handshake** with SHA-1/Base64 accept computation
//! - **Per-connection state machine** through the full close handshake
//! - **Shared registry** for broadcast, ping, and close fan-out
//! - **Resource limits** enforced before payload allocation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wscast::{Config, Server};
//!
//! let server = Server::new(Config::default());
//! server.run("127.0.0.1:9001").await?;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod server;

pub use codec::FrameCodec;
pub use config::{Config, Limits};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{compute_accept_key, HandshakeRequest, HandshakeResponse, OpCode, WS_GUID};
pub use registry::{ConnectionId, Registry, SessionCommand};
pub use server::{EchoPrefix, Server, SessionEvents};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionState>();
        assert_send::<ConnectionId>();
        assert_send::<Registry>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionState>();
        assert_sync::<ConnectionId>();
        assert_sync::<Registry>();
    }
}
