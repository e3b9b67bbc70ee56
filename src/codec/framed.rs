use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::frame::parse_header;
use crate::protocol::{Frame, FrameValidator};

/// Frame-level codec over an async byte stream.
///
/// Owns one bounded read buffer and one write buffer per connection. Reads
/// accumulate until a whole frame is buffered; a declared payload length
/// over the configured maximum is rejected from the header alone, before
/// any payload-sized allocation. Writes serialize into the write buffer
/// and reach the stream only on [`flush`](Self::flush), which drops each
/// chunk from the buffer as the transport accepts it. A flush future
/// cancelled mid-write therefore never strands a partial frame: the unsent
/// tail stays buffered and the next flush resumes exactly where it
/// stopped.
pub struct FrameCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    config: Config,
    validator: FrameValidator,
}

impl<T> FrameCodec<T> {
    /// Wrap a stream with server-side framing.
    #[must_use]
    pub fn new(io: T, config: Config) -> Self {
        let validator = FrameValidator::new(config.limits.clone())
            .with_accept_unmasked(config.accept_unmasked_frames);
        Self {
            io,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            config,
            validator,
        }
    }

    /// The connection configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> FrameCodec<T> {
    /// Read the next complete frame, accumulating partial input as needed.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` on EOF
    /// - validation errors ([`FrameValidator`]) and parse errors; an
    ///   `IncompleteFrame` never escapes this loop
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match parse_header(&self.read_buf) {
                Ok(header) => {
                    // Header is complete: vet the untrusted fields before the
                    // payload is buffered or copied anywhere.
                    self.validator.validate_incoming(
                        header.mask.is_some(),
                        header.rsv,
                        header.payload_len,
                    )?;

                    match Frame::parse(&self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Serialize one frame into the write buffer. Server frames are never
    /// masked. Nothing reaches the stream until [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Frame validation errors (oversized control payload). The buffer is
    /// left untouched on error.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let start = self.write_buf.len();
        self.write_buf.resize(start + frame.wire_size(false), 0);

        match frame.write(&mut self.write_buf[start..], None) {
            Ok(written) => {
                self.write_buf.truncate(start + written);
                Ok(())
            }
            Err(e) => {
                self.write_buf.truncate(start);
                Err(e)
            }
        }
    }

    /// Queue raw bytes (handshake responses) behind any buffered frames.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }

    /// Write the buffered bytes to the underlying stream.
    ///
    /// Each chunk is removed from the buffer as soon as the transport
    /// accepts it, so cancelling this future leaves the unsent remainder
    /// queued for the next call rather than a torn frame on the wire.
    pub async fn flush(&mut self) -> Result<()> {
        while !self.write_buf.is_empty() {
            let n = self.io.write(&self.write_buf).await?;
            if n == 0 {
                return Err(Error::Io("stream accepted no bytes".into()));
            }
            self.write_buf.advance(n);
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Read more handshake bytes into the read buffer, returning the bytes
    /// buffered so far. Returns `Error::ConnectionClosed` on EOF.
    pub(crate) async fn fill_handshake_buf(&mut self) -> Result<&[u8]> {
        let n = self.io.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed(None));
        }
        Ok(&self.read_buf)
    }

    /// Bytes currently buffered but not yet consumed.
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Drop `n` consumed bytes from the front of the read buffer.
    pub(crate) fn consume(&mut self, n: usize) {
        self.read_buf.advance(n);
    }
}
