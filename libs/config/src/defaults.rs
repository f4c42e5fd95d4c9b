//! Default configuration values
//!
//! Constants shared by the settings loader and the messaging core so both
//! sides agree on what an omitted value means.

/// Messaging link defaults
pub mod link {
    /// Endpoint used when none is configured or the configured one is unparsable
    pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:5000";

    /// Loopback port used by the connect command fallback
    pub const DEFAULT_PORT: u16 = 5000;

    /// Fixed wait between connect attempts (milliseconds)
    pub const RETRY_INTERVAL_MS: u64 = 1_000;

    /// Connect attempt budget; 0 and `u32::MAX` both mean unlimited
    pub const MAX_RETRY_ATTEMPTS: u32 = 0;

    /// Socket send buffer size (bytes)
    pub const SEND_BUFFER_SIZE: usize = 1024;

    /// Receive ring buffer size (bytes), also applied when 0 is configured
    pub const RECEIVE_BUFFER_SIZE: usize = 64 * 1024;

    /// Per-attempt connect timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Write timeout for a single packet (milliseconds)
    pub const WRITE_TIMEOUT_MS: u64 = 5_000;

    /// Receive poll timeout, bounds worker latency while connected (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 10;

    /// Worker wake interval while idle (milliseconds)
    pub const IDLE_WAIT_MS: u64 = 100;

    /// Largest payload accepted by length-prefixed framing (bytes)
    pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

    /// Wire framing name
    pub const FRAMING: &str = "raw";
}

/// Console front end defaults
pub mod console {
    /// Default tracing filter directive
    pub const LOG_LEVEL: &str = "info";

    /// Interactive prompt
    pub const PROMPT: &str = "datalink> ";
}
