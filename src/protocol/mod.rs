//! WebSocket protocol core (RFC 6455 subset: opcodes 0x0-0x2, 0x8-0xA).

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use frame::Frame;
pub use handshake::{
    compute_accept_key, find_request_end, HandshakeRequest, HandshakeResponse, WS_GUID,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use validation::FrameValidator;
