use crate::protocol::{Frame, OpCode};

/// Splits outgoing messages into fragments of a fixed maximum size.
///
/// The first fragment carries the data opcode, every later fragment carries
/// `Continuation`, and only the last sets the FIN bit. Messages at or under
/// the fragment size go out as a single final frame.
#[derive(Debug, Clone)]
pub struct MessageFragmenter {
    fragment_size: usize,
}

impl MessageFragmenter {
    #[must_use]
    pub fn new(fragment_size: usize) -> Self {
        // A zero fragment size would never make progress.
        Self {
            fragment_size: fragment_size.max(1),
        }
    }

    /// Fragment a data message into wire frames.
    pub fn fragment(&self, opcode: OpCode, payload: Vec<u8>) -> Vec<Frame> {
        debug_assert!(opcode.is_data());

        if payload.len() <= self.fragment_size {
            return vec![Frame::new(true, opcode, payload)];
        }

        let mut frames = Vec::with_capacity(payload.len().div_ceil(self.fragment_size));
        let mut chunks = payload.chunks(self.fragment_size).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let op = if first { opcode } else { OpCode::Continuation };
            let fin = chunks.peek().is_none();
            frames.push(Frame::new(fin, op, chunk.to_vec()));
            first = false;
        }

        frames
    }
}
