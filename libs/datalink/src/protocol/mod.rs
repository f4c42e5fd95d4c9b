//! Wire Protocol
//!
//! Framing between `DataPacket`s and the TCP byte stream.

pub mod framing;

// Re-export commonly used types
pub use framing::{FrameCodec, Framing, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
