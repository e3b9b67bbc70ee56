//! TCP accept loop, per-connection session tasks, and the operator console.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use crate::message::{CloseCode, Message};
use crate::registry::{ConnectionId, Registry, SessionCommand};

/// Payload attached to operator-initiated pings.
const LIVENESS_PING_PAYLOAD: &[u8] = b"liveness";

/// Application hooks invoked by session tasks.
pub trait SessionEvents: Send + Sync + 'static {
    /// Called for each complete text message. A returned string is sent
    /// back to the same peer.
    fn on_message(&self, id: ConnectionId, text: &str) -> Option<String>;

    /// Whether `text` asks the server to close this connection. The
    /// default recognizes the literal `close`.
    fn is_close_request(&self, text: &str) -> bool {
        text == "close"
    }

    /// Called once when the session ends, after the connection has left
    /// the registry.
    fn on_closed(&self, id: ConnectionId) {
        let _ = id;
    }
}

/// Default behavior: a text message carrying the `echo:` prefix is
/// answered with the remainder; anything else gets no reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoPrefix;

impl SessionEvents for EchoPrefix {
    fn on_message(&self, _id: ConnectionId, text: &str) -> Option<String> {
        text.strip_prefix("echo:").map(str::to_string)
    }
}

/// WebSocket server: accepts TCP connections, upgrades them, and runs one
/// session task per connection. A stdin console broadcasts operator
/// commands through the shared [`Registry`].
pub struct Server<H = EchoPrefix> {
    config: Config,
    registry: Registry,
    handler: Arc<H>,
}

impl Server<EchoPrefix> {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_handler(config, EchoPrefix)
    }
}

impl<H: SessionEvents> Server<H> {
    #[must_use]
    pub fn with_handler(config: Config, handler: H) -> Self {
        Self {
            config,
            registry: Registry::new(),
            handler: Arc::new(handler),
        }
    }

    /// The shared connection roster.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bind `addr` and serve until the task is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound; per-connection
    /// failures are logged and do not stop the accept loop.
    pub async fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");

        let console_registry = self.registry.clone();
        tokio::spawn(async move {
            run_console(console_registry).await;
        });

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "tcp connection accepted");

            let config = self.config.clone();
            let registry = self.registry.clone();
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                run_session(stream, config, registry, handler).await;
            });
        }
    }
}

/// Drive one connection from upgrade to teardown.
async fn run_session<H: SessionEvents>(
    stream: TcpStream,
    config: Config,
    registry: Registry,
    handler: Arc<H>,
) {
    let ping_timeout = config.ping_timeout;
    let mut conn = match Connection::accept(stream, config).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "handshake failed");
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = registry.register(tx).await;
    info!(%id, path = conn.path(), "connection open");

    // Armed when a liveness ping goes out; disarmed when the pong returns.
    let mut pong_deadline: Option<Instant> = None;
    let mut ping_sent_at = Instant::now();

    loop {
        tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(Message::Text(text))) => {
                    debug!(%id, len = text.len(), "text message");
                    if handler.is_close_request(&text) {
                        info!(%id, "close requested by peer");
                        if let Err(e) = conn.close(CloseCode::Normal, "requested").await {
                            warn!(%id, error = %e, "close failed");
                            break;
                        }
                    } else if let Some(reply) = handler.on_message(id, &text) {
                        if let Err(e) = conn.send(Message::text(reply)).await {
                            warn!(%id, error = %e, "send failed");
                            break;
                        }
                    }
                }
                Ok(Some(Message::Binary(data))) => {
                    debug!(%id, len = data.len(), "binary message ignored");
                }
                Ok(Some(Message::Close(close))) => {
                    let code = close.map(|c| c.code.as_u16());
                    info!(%id, ?code, "close received");
                    break;
                }
                Ok(Some(_)) | Ok(None) => break,
                Err(e) => {
                    warn!(%id, error = %e, "connection error");
                    break;
                }
            },

            command = rx.recv() => match command {
                Some(SessionCommand::SendText(text)) => {
                    if let Err(e) = conn.send(Message::text(text)).await {
                        warn!(%id, error = %e, "send failed");
                        break;
                    }
                }
                Some(SessionCommand::Ping) => {
                    if let Err(e) = conn.ping(LIVENESS_PING_PAYLOAD.to_vec()).await {
                        warn!(%id, error = %e, "ping failed");
                        break;
                    }
                    ping_sent_at = Instant::now();
                    pong_deadline = Some(ping_sent_at + ping_timeout);
                }
                Some(SessionCommand::Close) => {
                    if let Err(e) = conn.close(CloseCode::Normal, "server closing").await {
                        warn!(%id, error = %e, "close failed");
                        break;
                    }
                }
                None => break,
            },

            () = sleep_until(pong_deadline.unwrap_or_else(Instant::now)),
                if pong_deadline.is_some() =>
            {
                if conn.awaiting_pong() {
                    warn!(%id, "pong deadline expired");
                    if let Err(e) = conn.close(CloseCode::ProtocolError, "pong timeout").await {
                        debug!(%id, error = %e, "close after timeout failed");
                    }
                    break;
                }
                pong_deadline = None;
            }
        }

        // The pong may have arrived during any recv round.
        if pong_deadline.is_some() && !conn.awaiting_pong() {
            debug!(%id, latency = ?ping_sent_at.elapsed(), "pong received");
            pong_deadline = None;
        }
    }

    registry.unregister(id).await;
    handler.on_closed(id);
    info!(%id, "connection closed");
}

/// Read operator commands from stdin until EOF.
///
/// `close` starts the close handshake on every connection, `ping` probes
/// them all, and any other non-empty line is broadcast as a text message.
async fn run_console(registry: Registry) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "console read failed");
                return;
            }
        };

        match line.trim() {
            "" => {}
            "close" => {
                let n = registry.close_all().await;
                info!(connections = n, "close requested");
            }
            "ping" => {
                let n = registry.ping_all().await;
                info!(connections = n, "ping requested");
            }
            text => {
                let n = registry.broadcast_text(text).await;
                info!(connections = n, "broadcast sent");
            }
        }
    }
}
