//! End-to-end connection tests over an in-memory duplex stream.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use wscast::protocol::Frame;
use wscast::{
    CloseCode, CloseFrame, Config, Connection, ConnectionState, Error, Limits, Message, OpCode,
};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn upgrade_request() -> Vec<u8> {
    b"GET /chat HTTP/1.1\r\n\
      Host: localhost:9001\r\n\
      Upgrade: websocket\r\n\
      Connection: Upgrade\r\n\
      Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
      Sec-WebSocket-Version: 13\r\n\
      \r\n"
        .to_vec()
}

fn frame_bytes(frame: &Frame, mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut buf = vec![0u8; frame.wire_size(mask.is_some())];
    let written = frame.write(&mut buf, mask).unwrap();
    buf.truncate(written);
    buf
}

/// Client half of a test connection: raw duplex stream plus a read buffer
/// that survives across frame reads, so coalesced frames are not lost.
struct TestClient {
    stream: DuplexStream,
    buf: Vec<u8>,
}

impl TestClient {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn send_frame(&mut self, frame: &Frame, mask: Option<[u8; 4]>) {
        self.send_raw(&frame_bytes(frame, mask)).await;
    }

    async fn fill(&mut self) {
        let mut chunk = [0u8; 1024];
        let n = self.stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "stream closed with incomplete data");
        self.buf.extend_from_slice(&chunk[..n]);
    }

    /// Read until a complete HTTP response head is buffered.
    async fn read_response_head(&mut self) -> String {
        loop {
            if let Some(end) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head: Vec<u8> = self.buf.drain(..end + 4).collect();
                return String::from_utf8(head).unwrap();
            }
            self.fill().await;
        }
    }

    /// Read until the next complete frame parses.
    async fn read_frame(&mut self) -> Frame {
        loop {
            match Frame::parse(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(..consumed);
                    return frame;
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => panic!("unexpected parse error: {e}"),
            }
            self.fill().await;
        }
    }
}

async fn open_connection(config: Config) -> (Connection<DuplexStream>, TestClient) {
    let (client_io, server) = tokio::io::duplex(64 * 1024);
    let mut client = TestClient::new(client_io);
    client.send_raw(&upgrade_request()).await;

    let conn = Connection::accept(server, config).await.unwrap();
    let response = client.read_response_head().await;
    assert!(response.starts_with("HTTP/1.1 101"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

    (conn, client)
}

#[tokio::test]
async fn handshake_succeeds_and_text_round_trips() {
    let (mut conn, mut client) = open_connection(Config::default()).await;
    assert_eq!(conn.state(), ConnectionState::Open);
    assert_eq!(conn.path(), "/chat");

    client
        .send_frame(&Frame::text(b"Hello".to_vec()), Some(MASK))
        .await;

    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("Hello".into()));

    conn.send(Message::text("Hello back")).await.unwrap();
    let reply = client.read_frame().await;
    assert_eq!(reply.opcode, OpCode::Text);
    assert_eq!(reply.payload(), b"Hello back");
}

#[tokio::test]
async fn malformed_handshake_gets_400() {
    let (client_io, server) = tokio::io::duplex(64 * 1024);
    let mut client = TestClient::new(client_io);
    // Plain HTTP request with no upgrade headers.
    client
        .send_raw(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await;

    let result = Connection::accept(server, Config::default()).await;
    assert!(matches!(result, Err(Error::InvalidHandshake(_))));

    let response = client.read_response_head().await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn oversized_handshake_is_rejected() {
    let (client_io, server) = tokio::io::duplex(64 * 1024);
    let mut client = TestClient::new(client_io);
    // No terminator within the handshake budget.
    client.send_raw(&vec![b'A'; 16 * 1024]).await;

    let result = Connection::accept(server, Config::default()).await;
    assert!(matches!(result, Err(Error::HandshakeTooLarge { .. })));

    let response = client.read_response_head().await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn frames_piggybacked_on_handshake_are_not_lost() {
    let (client_io, server) = tokio::io::duplex(64 * 1024);
    let mut client = TestClient::new(client_io);
    let mut bytes = upgrade_request();
    bytes.extend(frame_bytes(&Frame::text(b"early".to_vec()), Some(MASK)));
    client.send_raw(&bytes).await;

    let mut conn = Connection::accept(server, Config::default()).await.unwrap();
    client.read_response_head().await;

    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("early".into()));
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    client
        .send_frame(&Frame::ping(b"abc".to_vec()), Some(MASK))
        .await;
    client
        .send_frame(&Frame::text(b"after".to_vec()), Some(MASK))
        .await;

    // The ping is absorbed; recv returns the following data message.
    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("after".into()));

    let pong = client.read_frame().await;
    assert_eq!(pong.opcode, OpCode::Pong);
    assert_eq!(pong.payload(), b"abc");
}

#[tokio::test]
async fn outstanding_ping_is_cleared_by_matching_pong() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    conn.ping(b"mark".to_vec()).await.unwrap();
    assert!(conn.awaiting_pong());

    let ping = client.read_frame().await;
    assert_eq!(ping.opcode, OpCode::Ping);

    // A pong with a different payload is unsolicited and must be ignored.
    client
        .send_frame(&Frame::pong(b"other".to_vec()), Some(MASK))
        .await;
    client
        .send_frame(&Frame::pong(b"mark".to_vec()), Some(MASK))
        .await;
    client
        .send_frame(&Frame::text(b"done".to_vec()), Some(MASK))
        .await;

    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("done".into()));
    assert!(!conn.awaiting_pong());
}

#[tokio::test]
async fn fragmented_message_is_reassembled() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    client
        .send_frame(&Frame::new(false, OpCode::Text, b"Hel".to_vec()), Some(MASK))
        .await;
    client
        .send_frame(
            &Frame::new(false, OpCode::Continuation, b"lo ".to_vec()),
            Some(MASK),
        )
        .await;
    client
        .send_frame(
            &Frame::new(true, OpCode::Continuation, b"World".to_vec()),
            Some(MASK),
        )
        .await;

    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("Hello World".into()));
}

#[tokio::test]
async fn control_frame_interleaves_with_fragments() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    client
        .send_frame(&Frame::new(false, OpCode::Text, b"part".to_vec()), Some(MASK))
        .await;
    client
        .send_frame(&Frame::ping(b"mid".to_vec()), Some(MASK))
        .await;
    client
        .send_frame(
            &Frame::new(true, OpCode::Continuation, b"ial".to_vec()),
            Some(MASK),
        )
        .await;

    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(message, Message::Text("partial".into()));

    let pong = client.read_frame().await;
    assert_eq!(pong.opcode, OpCode::Pong);
    assert_eq!(pong.payload(), b"mid");
}

#[tokio::test]
async fn large_outgoing_message_is_fragmented() {
    let config = Config::new().with_fragment_size(8);
    let (mut conn, mut client) = open_connection(config).await;

    conn.send(Message::binary(vec![0x42; 20])).await.unwrap();

    let first = client.read_frame().await;
    assert_eq!(first.opcode, OpCode::Binary);
    assert!(!first.fin);
    assert_eq!(first.payload().len(), 8);

    let mut rest = Vec::new();
    loop {
        let frame = client.read_frame().await;
        assert_eq!(frame.opcode, OpCode::Continuation);
        rest.extend_from_slice(frame.payload());
        if frame.fin {
            break;
        }
    }
    assert_eq!(rest, vec![0x42; 12]);
}

#[tokio::test]
async fn send_larger_than_transport_buffer_with_concurrent_reader() {
    let (mut conn, mut client) = open_connection(Config::default()).await;
    let payload = vec![7u8; 128 * 1024];

    // The message exceeds the duplex capacity, so the client must drain
    // while the server writes.
    let (send_result, received) = futures::join!(conn.send(Message::binary(payload.clone())), async {
        let mut data = Vec::new();
        loop {
            let frame = client.read_frame().await;
            data.extend_from_slice(frame.payload());
            if frame.fin {
                break;
            }
        }
        data
    });

    send_result.unwrap();
    assert_eq!(received, payload);
}

#[tokio::test]
async fn cancelled_receive_leaves_no_torn_pong() {
    // A 16-byte duplex forces backpressure on every reply.
    let (client_io, server) = tokio::io::duplex(16);
    let mut client = TestClient::new(client_io);

    let (mut conn, ()) = futures::join!(
        async { Connection::accept(server, Config::default()).await.unwrap() },
        async {
            // The 101 response exceeds the transport capacity, so the
            // handshake is driven from both ends.
            client.send_raw(&upgrade_request()).await;
            let response = client.read_response_head().await;
            assert!(response.starts_with("HTTP/1.1 101"));
        }
    );

    client
        .send_frame(&Frame::ping(b"0123456789".to_vec()), Some(MASK))
        .await;
    {
        let recv = conn.recv();
        tokio::pin!(recv);
        // The first pong fits the transport whole; recv then parks on the
        // next read and is dropped there.
        assert!(futures::poll!(recv.as_mut()).is_pending());
    }

    client
        .send_frame(&Frame::ping(b"abcdefghij".to_vec()), Some(MASK))
        .await;
    {
        let recv = conn.recv();
        tokio::pin!(recv);
        // With the first pong still undrained, this pong stalls partway
        // through; dropping recv here abandons it mid-write.
        assert!(futures::poll!(recv.as_mut()).is_pending());
    }

    // A follow-up send must not interleave with the abandoned pong.
    let (sent, ()) = futures::join!(conn.send(Message::text("done")), async {
        let pong = client.read_frame().await;
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload(), b"0123456789");

        let pong = client.read_frame().await;
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload(), b"abcdefghij");

        let text = client.read_frame().await;
        assert_eq!(text.opcode, OpCode::Text);
        assert_eq!(text.payload(), b"done");
    });
    sent.unwrap();
}

#[tokio::test]
async fn peer_close_is_echoed_once() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    client
        .send_frame(&Frame::close(Some(1001), "bye"), Some(MASK))
        .await;

    let message = conn.recv().await.unwrap().unwrap();
    assert_eq!(
        message,
        Message::Close(Some(CloseFrame::new(CloseCode::GoingAway, "bye")))
    );
    assert_eq!(conn.state(), ConnectionState::Closing);

    let echo = client.read_frame().await;
    assert_eq!(echo.opcode, OpCode::Close);
    assert_eq!(&echo.payload()[..2], &1001u16.to_be_bytes());

    // The peer hangs up; draining reaches the terminal state.
    drop(client);
    assert!(conn.recv().await.unwrap().is_none());
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn server_initiated_close_completes_on_peer_echo() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    conn.close(CloseCode::Normal, "server closing").await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Closing);
    assert!(matches!(
        conn.send(Message::text("late")).await,
        Err(Error::NotOpen)
    ));

    let close = client.read_frame().await;
    assert_eq!(close.opcode, OpCode::Close);

    client
        .send_frame(&Frame::close(Some(1000), ""), Some(MASK))
        .await;

    let message = conn.recv().await.unwrap().unwrap();
    assert!(matches!(message, Message::Close(Some(_))));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn oversized_frame_closes_with_1009() {
    let config = Config::new().with_limits(Limits::new(64, 256, 16, 8192));
    let (mut conn, mut client) = open_connection(config).await;

    client
        .send_frame(&Frame::binary(vec![0u8; 200]), Some(MASK))
        .await;

    let result = conn.recv().await;
    assert!(matches!(result, Err(Error::FrameTooLarge { .. })));
    assert_eq!(conn.state(), ConnectionState::Closing);

    let close = client.read_frame().await;
    assert_eq!(close.opcode, OpCode::Close);
    assert_eq!(&close.payload()[..2], &1009u16.to_be_bytes());
}

#[tokio::test]
async fn unmasked_client_frame_closes_with_1002() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    client.send_frame(&Frame::text(b"bare".to_vec()), None).await;

    let result = conn.recv().await;
    assert!(matches!(result, Err(Error::UnmaskedFrame)));

    let close = client.read_frame().await;
    assert_eq!(&close.payload()[..2], &1002u16.to_be_bytes());
}

#[tokio::test]
async fn invalid_utf8_text_closes_with_1007() {
    let (mut conn, mut client) = open_connection(Config::default()).await;

    client
        .send_frame(&Frame::text(vec![0xff, 0xfe, 0xfd]), Some(MASK))
        .await;

    let result = conn.recv().await;
    assert!(matches!(result, Err(Error::InvalidUtf8)));

    let close = client.read_frame().await;
    assert_eq!(&close.payload()[..2], &1007u16.to_be_bytes());
}

#[tokio::test]
async fn peer_disconnect_without_close_frame() {
    let (mut conn, client) = open_connection(Config::default()).await;
    drop(client);

    assert!(conn.recv().await.unwrap().is_none());
    assert_eq!(conn.state(), ConnectionState::Closed);
}
