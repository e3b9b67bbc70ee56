//! Message reassembly from fragmented frames (RFC 6455 section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented data messages.
///
/// Control frames never pass through here; they are processed immediately
/// by the state machine even in the middle of a fragmented message.
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler bounded by `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some(message)` when a `fin=true` frame completes it, `None`
    /// while more fragments are expected.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress, or a fresh Text/Binary while one is in progress
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` when limits
    ///   are exceeded
    /// - `Error::InvalidUtf8` when a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "continuation frame with no message in progress".into(),
                ));
            }
        } else {
            if self.opcode.is_some() {
                return Err(Error::ProtocolViolation(
                    "new data frame while a fragmented message is in progress".into(),
                ));
            }
            self.opcode = Some(frame.opcode);
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        let fin = frame.fin;
        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !fin {
            return Ok(None);
        }

        let payload = std::mem::take(&mut self.buffer).to_vec();
        let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
        self.fragment_count = 0;

        if opcode == OpCode::Text && std::str::from_utf8(&payload).is_err() {
            return Err(Error::InvalidUtf8);
        }

        Ok(Some(AssembledMessage { opcode, payload }))
    }

    /// Whether a fragmented message is currently in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}

/// A fully reassembled data message.
pub struct AssembledMessage {
    /// Opcode of the first fragment (Text or Binary).
    pub opcode: OpCode,
    /// Concatenated payloads of all fragments.
    pub payload: Vec<u8>,
}
