//! Buffered frame I/O over an async byte stream.

mod framed;

pub use framed::FrameCodec;
