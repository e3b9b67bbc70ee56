//! HTTP upgrade handshake (RFC 6455 section 4).
//!
//! The server reads the client's upgrade request, computes the accept value
//! (Base64 of the SHA-1 of key + GUID) and answers with a `101 Switching
//! Protocols` response. Lines are split on the byte `\n` with a trailing
//! `\r` trimmed.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The fixed GUID concatenated with the client key to form the accept value
/// (RFC 6455 section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
///
/// Pure function: Base64(SHA-1(key ++ GUID)). The randomness of the
/// handshake lives entirely in the client-chosen key.
///
/// # Example
///
/// ```
/// use wscast::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Find the end of the HTTP header block in `buf`.
///
/// Returns the index one past the terminating blank line, or `None` while
/// the request is still incomplete.
#[must_use]
pub fn find_request_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
}

/// Parsed client upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request path from the request line.
    pub path: String,
    /// The `Sec-WebSocket-Key` header value.
    pub key: String,
}

impl HandshakeRequest {
    /// Parse a complete upgrade request.
    ///
    /// Callers are expected to have already located the terminating blank
    /// line via [`find_request_end`]; this function treats missing pieces
    /// as malformed, not incomplete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - the data is not UTF-8,
    /// - the request line does not start with `GET `,
    /// - the `Upgrade: websocket` or `Connection: upgrade` headers are
    ///   missing,
    /// - `Sec-WebSocket-Key` is absent or does not decode to 16 bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("request is not valid UTF-8".into()))?;

        let mut lines = text.split('\n').map(|l| l.trim_end_matches('\r'));

        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("empty request".into()))?;
        let path = request_line
            .strip_prefix("GET ")
            .and_then(|rest| rest.split_whitespace().next())
            .ok_or_else(|| Error::InvalidHandshake("request line is not a GET".into()))?
            .to_string();

        let mut key = None;
        let mut upgrade_ok = false;
        let mut connection_ok = false;
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if name.eq_ignore_ascii_case("sec-websocket-key") {
                key = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("upgrade") {
                upgrade_ok = value.eq_ignore_ascii_case("websocket");
            } else if name.eq_ignore_ascii_case("connection") {
                connection_ok = value.to_ascii_lowercase().contains("upgrade");
            }
        }

        if !upgrade_ok {
            return Err(Error::InvalidHandshake("missing Upgrade: websocket".into()));
        }
        if !connection_ok {
            return Err(Error::InvalidHandshake("missing Connection: upgrade".into()));
        }
        let key =
            key.ok_or_else(|| Error::InvalidHandshake("missing Sec-WebSocket-Key".into()))?;

        match BASE64.decode(&key) {
            Ok(decoded) if decoded.len() == 16 => {}
            Ok(decoded) => {
                return Err(Error::InvalidHandshake(format!(
                    "Sec-WebSocket-Key must decode to 16 bytes, got {}",
                    decoded.len()
                )));
            }
            Err(_) => {
                return Err(Error::InvalidHandshake(
                    "Sec-WebSocket-Key is not valid Base64".into(),
                ));
            }
        }

        Ok(Self { path, key })
    }
}

/// Server upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The computed `Sec-WebSocket-Accept` value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Build the response for a parsed request.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
        }
    }

    /// Serialize the `101 Switching Protocols` response.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Serialize the minimal rejection sent for a malformed upgrade request.
    pub fn write_rejection(buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 400 Bad Request\r\n");
        buf.extend_from_slice(b"Connection: close\r\n");
        buf.extend_from_slice(b"\r\n");
    }
}
