//! Transport Error Types
//!
//! Error handling for socket I/O, framing, endpoint parsing, and the
//! caller-facing send path.

use std::net::SocketAddr;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Peer closed the stream
    #[error("Connection closed by peer {remote_addr}")]
    Closed { remote_addr: SocketAddr },

    /// Framing errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Receive ring buffer cannot hold the pending frame
    #[error("Receive buffer overflow: {needed} bytes needed, capacity {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The messaging service has been stopped
    #[error("Service stopped: {message}")]
    Shutdown { message: String },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    /// Create a peer-closed error
    pub fn closed(remote_addr: SocketAddr) -> Self {
        Self::Closed { remote_addr }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a buffer overflow error
    pub fn buffer_overflow(needed: usize, capacity: usize) -> Self {
        Self::BufferOverflow { needed, capacity }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a shutdown error
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Closed { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::BufferOverflow { .. } => true, // fresh connection, fresh buffer
            TransportError::Protocol { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Shutdown { .. } => false,
        }
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. }
                | TransportError::Connection { .. }
                | TransportError::Closed { .. }
                | TransportError::Timeout { .. }
        )
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Closed { .. } => "closed",
            TransportError::Protocol { .. } => "protocol",
            TransportError::BufferOverflow { .. } => "buffer_overflow",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Shutdown { .. } => "shutdown",
            TransportError::Io { .. } => "io",
        }
    }
}

// Custom Clone implementation since Box<dyn Error> doesn't implement Clone
impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::Network { message, .. } => TransportError::Network {
                message: message.clone(),
                source: None, // Source errors are not cloneable, so we omit them
            },
            TransportError::Connection {
                message,
                remote_addr,
                ..
            } => TransportError::Connection {
                message: message.clone(),
                remote_addr: *remote_addr,
                source: None,
            },
            TransportError::Closed { remote_addr } => TransportError::Closed {
                remote_addr: *remote_addr,
            },
            TransportError::Protocol { message } => TransportError::Protocol {
                message: message.clone(),
            },
            TransportError::BufferOverflow { needed, capacity } => TransportError::BufferOverflow {
                needed: *needed,
                capacity: *capacity,
            },
            TransportError::Configuration { message, field } => TransportError::Configuration {
                message: message.clone(),
                field: field.clone(),
            },
            TransportError::Timeout {
                operation,
                timeout_ms,
            } => TransportError::Timeout {
                operation: operation.clone(),
                timeout_ms: *timeout_ms,
            },
            TransportError::Shutdown { message } => TransportError::Shutdown {
                message: message.clone(),
            },
            TransportError::Io { message, source } => TransportError::Io {
                message: message.clone(),
                source: std::io::Error::new(source.kind(), message.as_str()),
            },
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Rejection reasons for `MessagingService::send`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The service was stopped; nothing will ever drain the queue
    #[error("messaging service is stopped")]
    Stopped,

    /// The configured outbound queue bound was reached; the newest packet is rejected
    #[error("outbound queue full ({capacity} packets pending)")]
    QueueFull { capacity: usize },
}

/// Endpoint string parse failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("endpoint is empty")]
    Empty,

    #[error("endpoint '{0}' has no port")]
    MissingPort(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid host '{0}'")]
    InvalidHost(String),
}
