//! Transport Layer
//!
//! A single blocking TCP connection plus the ring buffer it reassembles
//! inbound frames in. Only the worker thread touches these types.

pub mod ring_buffer;
pub mod tcp;

// Re-export transport types
pub use ring_buffer::{RingBuffer, DEFAULT_RING_CAPACITY};
pub use tcp::{ReceiveOutcome, TcpConnection, TcpConnectionStats};
