//! TCP Connection
//!
//! Owns exactly one `TcpStream` and turns it into bounded primitives the
//! worker loop can call without stalling: connect with a per-attempt timeout,
//! whole-packet sends with a write timeout, and a receive poll bounded by
//! the read timeout.

use super::ring_buffer::RingBuffer;
use crate::config::ConnectOptions;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::message::DataPacket;
use crate::protocol::FrameCodec;
use bytes::BytesMut;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one receive poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// This many bytes were appended to the ring buffer
    Data(usize),
    /// Nothing arrived within the poll interval
    WouldBlock,
    /// The peer closed its side of the stream
    Closed,
}

/// TCP connection wrapper with framing state
pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    connected_at: Instant,
    last_activity: Instant,
    bytes_sent: u64,
    bytes_received: u64,
    codec: FrameCodec,
    /// Partially received frames
    receive_buffer: RingBuffer,
    /// Reusable encode buffer
    write_buffer: BytesMut,
}

/// TCP connection statistics
#[derive(Debug, Clone)]
pub struct TcpConnectionStats {
    pub peer_addr: SocketAddr,
    pub connected_duration: Duration,
    pub last_activity: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub buffered_bytes: usize,
}

impl TcpConnection {
    /// Make one connect attempt against every resolved address of `endpoint`
    pub fn try_connect(endpoint: &Endpoint, options: &ConnectOptions) -> Result<Self> {
        let options = options.clone().normalized();
        let mut last_error = None;

        for addr in endpoint.resolve()? {
            debug!(%addr, timeout_ms = options.connect_timeout.as_millis() as u64, "Connecting to TCP peer");
            match TcpStream::connect_timeout(&addr, options.connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, &options),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    last_error = Some(TransportError::timeout(
                        format!("TCP connect to {}", addr),
                        options.connect_timeout.as_millis() as u64,
                    ));
                }
                Err(e) => {
                    last_error = Some(TransportError::connection_with_source(
                        "Failed to connect to TCP peer",
                        Some(addr),
                        e,
                    ));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::network(format!("No addresses to connect to for {}", endpoint))
        }))
    }

    /// Wrap an already connected stream and apply socket options
    pub fn from_stream(stream: TcpStream, options: &ConnectOptions) -> Result<Self> {
        let options = options.clone().normalized();

        // Configure TCP socket
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        stream.set_read_timeout(Some(options.poll_interval))?;
        stream.set_write_timeout(Some(options.write_timeout))?;
        apply_buffer_sizes(&stream, options.send_buffer_size, options.receive_buffer_size);

        let peer_addr = stream
            .peer_addr()
            .map_err(|e| TransportError::network_with_source("Failed to get peer address", e))?;

        let now = Instant::now();
        info!(peer = %peer_addr, framing = options.framing.name(), "Connected to TCP peer");

        Ok(Self {
            stream,
            peer_addr,
            connected_at: now,
            last_activity: now,
            bytes_sent: 0,
            bytes_received: 0,
            codec: FrameCodec::new(options.framing),
            receive_buffer: RingBuffer::with_capacity(options.receive_buffer_size),
            write_buffer: BytesMut::with_capacity(options.send_buffer_size.max(64)),
        })
    }

    /// Frame and write one packet
    ///
    /// Framing errors are returned before any byte is written. Any I/O error
    /// leaves the stream in an unknown state and must be treated as
    /// connection loss.
    pub fn send_packet(&mut self, packet: &DataPacket) -> Result<usize> {
        self.write_buffer.clear();
        self.codec.encode(packet, &mut self.write_buffer)?;

        let frame = self.write_buffer.split().freeze();
        let written = self.try_send(&frame)?;

        debug!(
            peer = %self.peer_addr,
            bytes = written,
            total_sent = self.bytes_sent,
            "Sent packet over TCP"
        );
        Ok(written)
    }

    /// Write `bytes` as one discrete write sequence
    pub fn try_send(&mut self, bytes: &[u8]) -> Result<usize> {
        self.stream.write_all(bytes).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::timeout(
                format!("TCP write to {}", self.peer_addr),
                self.stream
                    .write_timeout()
                    .ok()
                    .flatten()
                    .map_or(0, |t| t.as_millis() as u64),
            ),
            _ => TransportError::connection_with_source("Failed to write packet", Some(self.peer_addr), e),
        })?;

        self.stream
            .flush()
            .map_err(|e| TransportError::connection_with_source("Failed to flush TCP stream", Some(self.peer_addr), e))?;

        self.bytes_sent += bytes.len() as u64;
        self.last_activity = Instant::now();
        Ok(bytes.len())
    }

    /// Poll the socket once, bounded by the read timeout
    pub fn try_receive(&mut self) -> Result<ReceiveOutcome> {
        if self.receive_buffer.is_full() {
            return Err(TransportError::buffer_overflow(
                self.receive_buffer.len() + 1,
                self.receive_buffer.capacity(),
            ));
        }

        match self.receive_buffer.fill_from(&mut self.stream) {
            Ok(0) => {
                info!(peer = %self.peer_addr, "TCP peer closed the connection");
                Ok(ReceiveOutcome::Closed)
            }
            Ok(n) => {
                self.bytes_received += n as u64;
                self.last_activity = Instant::now();
                debug!(
                    peer = %self.peer_addr,
                    bytes = n,
                    buffered = self.receive_buffer.len(),
                    "Received bytes over TCP"
                );
                Ok(ReceiveOutcome::Data(n))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(ReceiveOutcome::WouldBlock)
            }
            Err(e) => Err(TransportError::connection_with_source(
                "Failed to read from TCP stream",
                Some(self.peer_addr),
                e,
            )),
        }
    }

    /// Next complete inbound packet, if the buffer holds one
    pub fn next_packet(&mut self) -> Result<Option<DataPacket>> {
        self.codec.decode(&mut self.receive_buffer)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get connection statistics
    pub fn stats(&self) -> TcpConnectionStats {
        TcpConnectionStats {
            peer_addr: self.peer_addr,
            connected_duration: self.connected_at.elapsed(),
            last_activity: self.last_activity.elapsed(),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            buffered_bytes: self.receive_buffer.len(),
        }
    }

    /// Close both directions of the stream
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Error shutting down TCP connection: {}", e);
        }
        info!(
            peer = %self.peer_addr,
            bytes_sent = self.bytes_sent,
            bytes_received = self.bytes_received,
            "Closed TCP connection"
        );
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer_addr", &self.peer_addr)
            .field("framing", &self.codec.framing())
            .field("bytes_sent", &self.bytes_sent)
            .field("bytes_received", &self.bytes_received)
            .finish()
    }
}

#[cfg(unix)]
fn apply_buffer_sizes(stream: &TcpStream, send: usize, receive: usize) {
    use nix::sys::socket::{setsockopt, sockopt};

    if send > 0 {
        if let Err(e) = setsockopt(stream, sockopt::SndBuf, &send) {
            warn!(size = send, "Failed to set SO_SNDBUF: {}", e);
        }
    }
    if receive > 0 {
        if let Err(e) = setsockopt(stream, sockopt::RcvBuf, &receive) {
            warn!(size = receive, "Failed to set SO_RCVBUF: {}", e);
        }
    }
}

#[cfg(not(unix))]
fn apply_buffer_sizes(_stream: &TcpStream, _send: usize, _receive: usize) {}
