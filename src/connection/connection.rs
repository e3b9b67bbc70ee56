use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::state::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{
    find_request_end, Frame, HandshakeRequest, HandshakeResponse, MessageAssembler, OpCode,
};

/// A server-side WebSocket connection over any async byte stream.
///
/// Drives the full per-connection lifecycle: HTTP upgrade, framed message
/// exchange with automatic ping replies and fragment reassembly, and the
/// close handshake. Protocol violations trigger an outgoing close frame
/// with the matching status code before the error is surfaced.
pub struct Connection<T> {
    codec: FrameCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
    fragmenter: MessageFragmenter,
    /// Payload of the last ping we sent, awaiting an echoing pong.
    outstanding_ping: Option<Vec<u8>>,
    /// Request path from the upgrade request.
    path: String,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Accept an incoming connection: read the HTTP upgrade request, send
    /// the 101 response, and return an open connection.
    ///
    /// A request that cannot be parsed as a WebSocket upgrade gets a
    /// `400 Bad Request` before the error is returned; the stream should
    /// then be dropped. A request with no terminator within the configured
    /// handshake size budget is rejected the same way.
    ///
    /// # Errors
    ///
    /// `Error::InvalidHandshake`, `Error::HandshakeTooLarge`, or I/O errors.
    pub async fn accept(io: T, config: Config) -> Result<Self> {
        let mut codec = FrameCodec::new(io, config.clone());

        let request_end = loop {
            if let Some(end) = find_request_end(codec.buffered()) {
                break end;
            }
            if let Err(e) = config.limits.check_handshake_size(codec.buffered().len()) {
                return Err(reject_handshake(&mut codec, e).await);
            }
            codec.fill_handshake_buf().await?;
        };
        if let Err(e) = config.limits.check_handshake_size(request_end) {
            return Err(reject_handshake(&mut codec, e).await);
        }

        let request = match HandshakeRequest::parse(&codec.buffered()[..request_end]) {
            Ok(request) => request,
            Err(e) => return Err(reject_handshake(&mut codec, e).await),
        };

        let mut response = Vec::new();
        HandshakeResponse::from_request(&request).write(&mut response);
        codec.write_raw(&response);
        codec.flush().await?;

        // Frame bytes may have arrived piggybacked on the request.
        codec.consume(request_end);

        let fragmenter = MessageFragmenter::new(config.fragment_size);
        let assembler = MessageAssembler::new(config.limits.clone());
        Ok(Self {
            codec,
            state: ConnectionState::Open,
            assembler,
            fragmenter,
            outstanding_ping: None,
            path: request.path,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Request path the client upgraded on.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a ping is outstanding with no pong received yet.
    #[must_use]
    pub fn awaiting_pong(&self) -> bool {
        self.outstanding_ping.is_some()
    }

    /// Receive the next application message.
    ///
    /// Pings are answered automatically and pongs are matched against the
    /// last outstanding ping; neither is returned to the caller. Returns
    /// `Ok(None)` once the connection has fully closed, whether by a
    /// completed close handshake or by the peer ending the stream.
    ///
    /// Cancellation safe: partially read frames stay in the codec's read
    /// buffer, and automatic replies (pongs, close echoes) that have not
    /// reached the stream stay queued and go out with the next write.
    ///
    /// # Errors
    ///
    /// Protocol violations are surfaced after a close frame with the
    /// appropriate status code has been sent to the peer.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            if !self.state.can_receive() {
                return Ok(None);
            }

            let frame = match self.codec.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    // Peer dropped the stream without a close frame.
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Err(e) => return Err(self.fail(e).await),
            };

            if let Err(e) = frame.validate() {
                return Err(self.fail(e).await);
            }

            // While closing, everything except the peer's close is drained
            // unprocessed.
            if self.state == ConnectionState::Closing && frame.opcode != OpCode::Close {
                continue;
            }

            match frame.opcode {
                OpCode::Ping => {
                    let payload = frame.into_payload();
                    self.codec.write_frame(&Frame::pong(payload))?;
                    self.codec.flush().await?;
                }
                OpCode::Pong => {
                    // An unsolicited or stale pong is ignored.
                    if self
                        .outstanding_ping
                        .as_deref()
                        .is_some_and(|sent| sent == frame.payload())
                    {
                        self.outstanding_ping = None;
                    }
                }
                OpCode::Close => {
                    let close = parse_close_payload(frame.payload());
                    if self.state == ConnectionState::Open {
                        // Peer initiated: echo the status code back, then
                        // drain until the stream ends.
                        let code = close.as_ref().map(|c| c.code.as_u16());
                        self.codec.write_frame(&Frame::close(code, ""))?;
                        self.codec.flush().await?;
                        self.state = ConnectionState::Closing;
                    } else {
                        // We initiated; the peer's close completes the
                        // exchange in both directions.
                        self.state = ConnectionState::Closed;
                    }
                    return Ok(Some(Message::Close(close)));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    match self.assembler.push(frame) {
                        Ok(Some(assembled)) => {
                            let message = match assembled.opcode {
                                OpCode::Text => {
                                    // Assembler already verified UTF-8.
                                    match String::from_utf8(assembled.payload) {
                                        Ok(text) => Message::Text(text),
                                        Err(_) => {
                                            return Err(self.fail(Error::InvalidUtf8).await)
                                        }
                                    }
                                }
                                _ => Message::Binary(assembled.payload),
                            };
                            return Ok(Some(message));
                        }
                        Ok(None) => {}
                        Err(e) => return Err(self.fail(e).await),
                    }
                }
            }
        }
    }

    /// Send an application message, fragmenting data payloads that exceed
    /// the configured fragment size.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen` unless the connection state is `Open`.
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::NotOpen);
        }

        match message {
            Message::Text(text) => {
                self.send_data(OpCode::Text, text.into_bytes()).await?;
            }
            Message::Binary(data) => {
                self.send_data(OpCode::Binary, data).await?;
            }
            Message::Ping(payload) => {
                self.outstanding_ping = Some(payload.clone());
                self.codec.write_frame(&Frame::ping(payload))?;
                self.codec.flush().await?;
            }
            Message::Pong(payload) => {
                self.codec.write_frame(&Frame::pong(payload))?;
                self.codec.flush().await?;
            }
            Message::Close(close) => {
                let (code, reason) = match &close {
                    Some(c) => (Some(c.code.as_u16()), c.reason.as_str()),
                    None => (None, ""),
                };
                self.codec.write_frame(&Frame::close(code, reason))?;
                self.codec.flush().await?;
                self.state = ConnectionState::Closing;
            }
        }
        Ok(())
    }

    /// Send a ping and record the payload for pong matching.
    pub async fn ping(&mut self, payload: Vec<u8>) -> Result<()> {
        self.send(Message::Ping(payload)).await
    }

    /// Initiate the close handshake. No-op if closing already started.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        self.send(Message::Close(Some(CloseFrame::new(code, reason))))
            .await
    }

    async fn send_data(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<()> {
        for frame in self.fragmenter.fragment(opcode, payload) {
            self.codec.write_frame(&frame)?;
        }
        self.codec.flush().await?;
        Ok(())
    }

    /// React to a receive-path failure: protocol violations get a close
    /// frame with the matching status code and leave the connection in
    /// `Closing`; transport failures go straight to `Closed`. Returns the
    /// original error for the caller to propagate.
    async fn fail(&mut self, error: Error) -> Error {
        if self.state == ConnectionState::Open && error.is_protocol_error() {
            // Best effort: the stream may already be unusable.
            let code = close_code_for(&error);
            let frame = Frame::close(Some(code.as_u16()), "");
            if self.codec.write_frame(&frame).is_ok() {
                let _ = self.codec.flush().await;
            }
            self.state = ConnectionState::Closing;
        } else {
            self.state = ConnectionState::Closed;
        }
        error
    }
}

/// Best-effort `400 Bad Request` before the stream is dropped. Returns
/// the original handshake error for the caller to propagate.
async fn reject_handshake<T: AsyncRead + AsyncWrite + Unpin>(
    codec: &mut FrameCodec<T>,
    error: Error,
) -> Error {
    let mut rejection = Vec::new();
    HandshakeResponse::write_rejection(&mut rejection);
    codec.write_raw(&rejection);
    let _ = codec.flush().await;
    error
}

/// Decode a close frame payload into code and reason.
fn parse_close_payload(payload: &[u8]) -> Option<CloseFrame> {
    if payload.len() < 2 {
        return None;
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
    Some(CloseFrame::new(CloseCode::from_u16(code), reason))
}

/// Map a protocol violation to the RFC 6455 close status to send.
fn close_code_for(error: &Error) -> CloseCode {
    match error {
        Error::InvalidUtf8 => CloseCode::InvalidPayload,
        Error::FrameTooLarge { .. }
        | Error::MessageTooLarge { .. }
        | Error::TooManyFragments { .. } => CloseCode::MessageTooBig,
        _ => CloseCode::ProtocolError,
    }
}
