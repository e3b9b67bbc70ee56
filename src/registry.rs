//! Shared roster of live connections.
//!
//! Session tasks own their sockets; the registry holds only a command
//! channel per connection, so control-plane callers (the console, other
//! sessions) can reach any connection without touching its stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Stable identifier for one accepted connection.
///
/// Allocated from a process-wide counter; never reused, so a command
/// addressed to a departed connection fails instead of hitting a newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate the next identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Control-plane commands delivered to a session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send a text message to the peer.
    SendText(String),
    /// Send an unsolicited ping and arm the liveness deadline.
    Ping,
    /// Start the close handshake with a normal-closure code.
    Close,
}

type CommandSender = mpsc::UnboundedSender<SessionCommand>;

/// Thread-safe roster mapping connection ids to their command channels.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    connections: Arc<RwLock<HashMap<ConnectionId, CommandSender>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning its freshly allocated id.
    pub async fn register(&self, sender: CommandSender) -> ConnectionId {
        let id = ConnectionId::next();
        self.connections.write().await.insert(id, sender);
        id
    }

    /// Remove a connection. Safe to call after the session already left.
    pub async fn unregister(&self, id: ConnectionId) {
        self.connections.write().await.remove(&id);
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Ids of all live connections, in ascending order.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Deliver a command to one connection.
    ///
    /// # Errors
    ///
    /// `Error::UnknownConnection` if the id is not registered or the
    /// session task has already exited.
    pub async fn send(&self, id: ConnectionId, command: SessionCommand) -> Result<()> {
        let connections = self.connections.read().await;
        let sender = connections
            .get(&id)
            .ok_or(Error::UnknownConnection(id.as_u64()))?;
        sender
            .send(command)
            .map_err(|_| Error::UnknownConnection(id.as_u64()))
    }

    /// Send a text message to one connection.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_text(&self, id: ConnectionId, text: impl Into<String>) -> Result<()> {
        self.send(id, SessionCommand::SendText(text.into())).await
    }

    /// Probe one connection's liveness with a ping.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn ping(&self, id: ConnectionId) -> Result<()> {
        self.send(id, SessionCommand::Ping).await
    }

    /// Start the close handshake on one connection.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn close(&self, id: ConnectionId) -> Result<()> {
        self.send(id, SessionCommand::Close).await
    }

    /// Deliver a command to every live connection, returning how many
    /// sessions accepted it.
    pub async fn send_all(&self, command: SessionCommand) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|sender| sender.send(command.clone()).is_ok())
            .count()
    }

    /// Broadcast a text message.
    pub async fn broadcast_text(&self, text: impl Into<String>) -> usize {
        self.send_all(SessionCommand::SendText(text.into())).await
    }

    /// Ping every connection.
    pub async fn ping_all(&self) -> usize {
        self.send_all(SessionCommand::Ping).await
    }

    /// Start the close handshake on every connection.
    pub async fn close_all(&self) -> usize {
        self.send_all(SessionCommand::Close).await
    }
}
