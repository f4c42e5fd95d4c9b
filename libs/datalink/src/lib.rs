//! DataLink Messaging Core
//!
//! A single-connection TCP client that connects with fixed-interval
//! retries, queues outbound packets without blocking the caller, and
//! reassembles inbound bytes into packets on a dedicated worker thread.
//!
//! ```no_run
//! use datalink::{ConnectOptions, DataPacket, Endpoint, MessagingService};
//!
//! let service = MessagingService::new();
//! let endpoint: Endpoint = "127.0.0.1:5000".parse()?;
//! service.connect_socket(endpoint, ConnectOptions::default())?;
//! service.send(DataPacket::from_args(["foo", "bar"]))?;
//! service.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod commands;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod retry;
pub mod service;
pub mod transports;

mod worker;

// Re-export commonly used types
pub use commands::{CommandError, CommandHandler, CommandOutcome, CommandRegistry};
pub use config::{endpoint_from_settings, ConnectOptions, ServiceConfig};
pub use endpoint::{Endpoint, Host};
pub use error::{EndpointParseError, Result, SendError, TransportError};
pub use message::DataPacket;
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use protocol::{FrameCodec, Framing};
pub use retry::{RetryLimit, RetrySchedule, RetryStep};
pub use service::{LinkEvent, LinkState, MessagingService};
pub use transports::{ReceiveOutcome, RingBuffer, TcpConnection};

// Constants for configuration
pub const DEFAULT_PORT: u16 = datalink_config::defaults::link::DEFAULT_PORT;
pub const DEFAULT_SEND_BUFFER_SIZE: usize = datalink_config::defaults::link::SEND_BUFFER_SIZE;
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = datalink_config::defaults::link::RECEIVE_BUFFER_SIZE;
