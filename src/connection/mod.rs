//! Per-connection lifecycle: upgrade, message exchange, close handshake.
//!
//! ## Connection lifecycle
//!
//! 1. **Handshaking** - reading the HTTP upgrade request
//! 2. **Open** - upgrade accepted, messages flow
//! 3. **Closing** - close frame sent or received, draining
//! 4. **Closed** - terminal
//!
//! ## Example
//!
//! ```rust,ignore
//! use wscast::{Config, Connection, Message, CloseCode};
//!
//! let (stream, _) = listener.accept().await?;
//! let mut conn = Connection::accept(stream, Config::default()).await?;
//!
//! while let Some(msg) = conn.recv().await? {
//!     if let Message::Text(text) = msg {
//!         conn.send(Message::text(format!("echo:{text}"))).await?;
//!     }
//! }
//! ```

#[allow(clippy::module_inception)]
mod connection;
mod fragmenter;
mod state;

pub use connection::Connection;
pub use fragmenter::MessageFragmenter;
pub use state::ConnectionState;
