//! Frame parsing and serialization (RFC 6455 section 5).
//!
//! The header is decoded with explicit shift/mask arithmetic over the byte
//! sequence; no layout-dependent tricks, so the decode is portable and
//! byte-order independent.

use crate::error::{Error, Result};
use crate::protocol::mask::apply_mask_fast;
use crate::protocol::OpCode;

/// Maximum payload size for control frames (RFC 6455 section 5.5).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded fixed-size header fields, before the payload is touched.
#[derive(Debug, Clone)]
pub(crate) struct FrameHeader {
    pub fin: bool,
    /// Raw RSV bits (header bits 4-6). Must be zero: no extension is ever
    /// negotiated by this engine.
    pub rsv: u8,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: usize,
    pub header_len: usize,
}

/// Parse the frame header from the start of `buf`.
///
/// Never allocates; this runs before any limit check so callers can reject
/// a hostile declared length without buffering the payload.
///
/// # Errors
///
/// - `Error::IncompleteFrame` if the header is not fully buffered yet
/// - `Error::ReservedOpcode` / `Error::InvalidOpcode` for bad opcodes
pub(crate) fn parse_header(buf: &[u8]) -> Result<FrameHeader> {
    if buf.len() < 2 {
        return Err(Error::IncompleteFrame {
            needed: 2 - buf.len(),
        });
    }

    let byte0 = buf[0];
    let byte1 = buf[1];

    let fin = (byte0 & 0x80) != 0;
    let rsv = (byte0 >> 4) & 0x07;
    let opcode = OpCode::from_u8(byte0 & 0x0F)?;

    let masked = (byte1 & 0x80) != 0;
    let len_field = byte1 & 0x7F;

    // 126 -> 16-bit extended length, 127 -> 64-bit, both big-endian.
    let (payload_len, len_size) = match len_field {
        0..=125 => (len_field as usize, 2),
        126 => {
            if buf.len() < 4 {
                return Err(Error::IncompleteFrame {
                    needed: 4 - buf.len(),
                });
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        _ => {
            if buf.len() < 10 {
                return Err(Error::IncompleteFrame {
                    needed: 10 - buf.len(),
                });
            }
            let len = u64::from_be_bytes([
                buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
            ]);
            let len = usize::try_from(len).map_err(|_| {
                Error::InvalidFrame(format!("64-bit payload length {len} exceeds address space"))
            })?;
            (len, 10)
        }
    };

    let header_len = if masked { len_size + 4 } else { len_size };
    if masked && buf.len() < header_len {
        return Err(Error::IncompleteFrame {
            needed: header_len - buf.len(),
        });
    }

    let mask = if masked {
        Some([
            buf[len_size],
            buf[len_size + 1],
            buf[len_size + 2],
            buf[len_size + 3],
        ])
    } else {
        None
    };

    Ok(FrameHeader {
        fin,
        rsv,
        opcode,
        mask,
        payload_len,
        header_len,
    })
}

/// A single WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
/// |N|V|V|V|       |S|             |  (if payload len==126/127)    |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                 Masking key (if MASK set)                     |
/// +---------------------------------------------------------------+
/// |                        Payload data                           |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Raw RSV bits. Zero on every frame this engine produces or accepts.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv: 0,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = if let Some(code) = code {
            let mut data = code.to_be_bytes().to_vec();
            data.extend_from_slice(reason.as_bytes());
            data
        } else {
            Vec::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one frame from `buf`, returning the frame and the number of
    /// bytes consumed. Masked payloads are unmasked during the copy.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if the buffer holds less than one frame;
    ///   the caller must accumulate more input and retry
    /// - `Error::ReservedOpcode` / `Error::InvalidOpcode` for bad opcodes
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = parse_header(buf)?;

        let total = header
            .header_len
            .checked_add(header.payload_len)
            .ok_or_else(|| Error::InvalidFrame("frame length overflow".into()))?;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }

        Ok((
            Frame {
                fin: header.fin,
                rsv: header.rsv,
                opcode: header.opcode,
                payload,
            },
            total,
        ))
    }

    /// Validate the frame against RFC 6455 structural rules.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::FragmentedControlFrame` for a control frame with FIN=0
    /// - `Error::ControlFrameTooLarge` for a control payload over 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }
        Ok(())
    }

    /// Serialize the frame into `buf`, returning the number of bytes written.
    ///
    /// The minimal length encoding is chosen automatically. `mask` must be
    /// `None` for server-originated frames; tests acting as a client pass a
    /// key to produce a compliant client frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if `buf` is too small, plus the
    /// [`validate`](Self::validate) errors for malformed control frames.
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        self.validate()?;

        let payload_len = self.payload.len();
        let (len_field, ext_len) = if payload_len <= 125 {
            (payload_len as u8, 0)
        } else if payload_len <= 65535 {
            (126, 2)
        } else {
            (127, 8)
        };

        let mask_len = if mask.is_some() { 4 } else { 0 };
        let total = 2 + ext_len + mask_len + payload_len;
        if buf.len() < total {
            return Err(Error::InvalidFrame(format!(
                "buffer too small: need {total} bytes, have {}",
                buf.len()
            )));
        }

        buf[0] = self.opcode.as_u8() | if self.fin { 0x80 } else { 0 };
        buf[1] = len_field | if mask.is_some() { 0x80 } else { 0 };

        let mut offset = 2;
        match ext_len {
            2 => {
                buf[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
                offset = 4;
            }
            8 => {
                buf[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
                offset = 10;
            }
            _ => {}
        }

        if let Some(key) = mask {
            buf[offset..offset + 4].copy_from_slice(&key);
            offset += 4;
        }

        buf[offset..offset + payload_len].copy_from_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask_fast(&mut buf[offset..offset + payload_len], key);
        }

        Ok(total)
    }

    /// Number of bytes [`write`](Self::write) will produce.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let ext_len = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        2 + ext_len + if masked { 4 } else { 0 } + payload_len
    }
}
