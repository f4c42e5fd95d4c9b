//! Link configuration
//!
//! `ConnectOptions` travel with every `connect_socket` call; `ServiceConfig`
//! is fixed for the lifetime of a `MessagingService`. Both can be built from
//! the file/env-backed `datalink_config::LinkSettings`.

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::protocol::Framing;
use crate::retry::RetryLimit;
use datalink_config::defaults::link as defaults;
use datalink_config::LinkSettings;
use std::time::Duration;

/// Socket primitives reject zero timeouts
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Per-connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Fixed wait between connect attempts
    pub retry_interval: Duration,
    /// Connect attempt budget
    pub max_retry_attempts: RetryLimit,
    /// `SO_SNDBUF` for the socket
    pub send_buffer_size: usize,
    /// `SO_RCVBUF` and receive ring capacity; 0 selects the default
    pub receive_buffer_size: usize,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Bound on writing a single packet
    pub write_timeout: Duration,
    /// Bound on a single receive poll while connected
    pub poll_interval: Duration,
    /// Wire framing
    pub framing: Framing,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(defaults::RETRY_INTERVAL_MS),
            max_retry_attempts: RetryLimit::from_raw(defaults::MAX_RETRY_ATTEMPTS),
            send_buffer_size: defaults::SEND_BUFFER_SIZE,
            receive_buffer_size: defaults::RECEIVE_BUFFER_SIZE,
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(defaults::WRITE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            framing: Framing::Raw,
        }
    }
}

impl ConnectOptions {
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_retry_attempts(mut self, limit: RetryLimit) -> Self {
        self.max_retry_attempts = limit;
        self
    }

    pub fn with_send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = size;
        self
    }

    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Clamp timeouts into the range the socket API accepts
    pub(crate) fn normalized(mut self) -> Self {
        self.connect_timeout = self.connect_timeout.max(MIN_TIMEOUT);
        self.write_timeout = self.write_timeout.max(MIN_TIMEOUT);
        self.poll_interval = self.poll_interval.max(MIN_TIMEOUT);
        self
    }
}

/// Parameters fixed for one `MessagingService`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Worker wake interval while nothing is scheduled
    pub idle_wait: Duration,
    /// Outbound queue bound; `None` is unbounded
    pub queue_capacity: Option<usize>,
    /// Options used by the connect command when none are given
    pub connect_defaults: ConnectOptions,
    /// Worker thread name
    pub thread_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(defaults::IDLE_WAIT_MS),
            queue_capacity: None,
            connect_defaults: ConnectOptions::default(),
            thread_name: "datalink-worker".to_string(),
        }
    }
}

impl TryFrom<&LinkSettings> for ConnectOptions {
    type Error = TransportError;

    fn try_from(settings: &LinkSettings) -> Result<Self> {
        Ok(Self {
            retry_interval: Duration::from_millis(settings.retry_interval_ms),
            max_retry_attempts: RetryLimit::from_raw(settings.max_retry_attempts),
            send_buffer_size: settings.send_buffer_size,
            receive_buffer_size: settings.receive_buffer_size,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            write_timeout: Duration::from_millis(settings.write_timeout_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            framing: match settings.framing.parse::<Framing>()? {
                Framing::Raw => Framing::Raw,
                Framing::LengthPrefixed { .. } => Framing::LengthPrefixed {
                    max_frame_size: settings.max_frame_size,
                },
            },
        })
    }
}

impl TryFrom<&LinkSettings> for ServiceConfig {
    type Error = TransportError;

    fn try_from(settings: &LinkSettings) -> Result<Self> {
        if settings.queue_capacity == Some(0) {
            return Err(TransportError::configuration(
                "queue_capacity must be at least 1",
                Some("queue_capacity"),
            ));
        }
        Ok(Self {
            idle_wait: Duration::from_millis(settings.idle_wait_ms),
            queue_capacity: settings.queue_capacity,
            connect_defaults: ConnectOptions::try_from(settings)?,
            ..Self::default()
        })
    }
}

/// Parse the configured endpoint
pub fn endpoint_from_settings(settings: &LinkSettings) -> Result<Endpoint> {
    settings.endpoint.parse().map_err(|e| {
        TransportError::configuration(
            format!("Invalid endpoint '{}': {}", settings.endpoint, e),
            Some("endpoint"),
        )
    })
}
