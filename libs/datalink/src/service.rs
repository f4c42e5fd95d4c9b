//! Messaging Service
//!
//! Public coordinator for one link. Callers enqueue work through a command
//! channel and observe the link through `subscribe`, `state` and `metrics`;
//! every socket operation happens on the worker thread spawned by `start`.

use crate::config::{ConnectOptions, ServiceConfig};
use crate::endpoint::Endpoint;
use crate::error::{Result, SendError, TransportError};
use crate::message::DataPacket;
use crate::metrics::{LinkMetrics, MetricsSnapshot};
use crate::worker::{Worker, WorkerCommand};
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Connection state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No connect has been requested
    #[default]
    Idle,
    /// Attempting to connect, or waiting for the next attempt
    Connecting,
    /// A live connection is established
    Connected,
    /// The attempt budget ran out; a new `connect_socket` starts over
    Failed,
    /// The service was stopped
    Stopped,
}

/// Notifications published by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Attempt number `attempt` is starting
    Connecting { endpoint: Endpoint, attempt: u32 },
    /// One attempt failed; another may follow
    ConnectAttemptFailed {
        endpoint: Endpoint,
        attempt: u32,
        error: String,
    },
    /// A connection is live
    Connected { endpoint: Endpoint, peer: SocketAddr },
    /// The attempt budget is spent
    ConnectionFailed { endpoint: Endpoint, attempts: u32 },
    /// A live connection was closed or lost
    Disconnected { peer: SocketAddr, reason: String },
    /// A complete inbound packet
    PacketReceived(DataPacket),
    /// An outbound packet could not be framed and was dropped
    PacketRejected { packet: DataPacket, reason: String },
    /// Inbound data could not be framed; the connection is dropped
    ReceiveError { error: String },
}

/// State shared between the service handle and its worker
pub(crate) struct SharedState {
    pub(crate) running: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) state: RwLock<LinkState>,
    pub(crate) subscribers: Mutex<Vec<Sender<LinkEvent>>>,
    pub(crate) metrics: LinkMetrics,
    /// Packets accepted by `send` and not yet written or discarded
    pub(crate) pending: AtomicUsize,
}

impl SharedState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            state: RwLock::new(LinkState::Idle),
            subscribers: Mutex::new(Vec::new()),
            metrics: LinkMetrics::new(),
            pending: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_state(&self, state: LinkState) {
        let mut current = self.state.write();
        if *current != state {
            debug!(from = ?*current, to = ?state, "Link state changed");
            *current = state;
        }
    }

    /// Deliver `event` to every live subscriber, pruning dropped receivers
    pub(crate) fn publish(&self, event: LinkEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn release_pending(&self, count: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(count))
            });
    }
}

/// Single-connection TCP messaging service
pub struct MessagingService {
    config: ServiceConfig,
    command_tx: Sender<WorkerCommand>,
    /// Held until `start` hands it to the worker
    command_rx: Mutex<Option<Receiver<WorkerCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<SharedState>,
}

impl MessagingService {
    /// Create a service with default configuration
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let (command_tx, command_rx) = unbounded();
        Self {
            config,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            worker: Mutex::new(None),
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Spawn the worker thread
    ///
    /// Idempotent while running. Fails once the service has been stopped.
    pub fn start(&self) -> Result<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(TransportError::shutdown("cannot start a stopped service"));
        }

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let Some(commands) = self.command_rx.lock().take() else {
            return Err(TransportError::shutdown("worker command channel already consumed"));
        };

        let worker_state = Worker::new(commands, Arc::clone(&self.shared), self.config.idle_wait);
        self.shared.running.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker_state.run())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                TransportError::network_with_source("Failed to spawn worker thread", e)
            })?;

        info!(thread = %self.config.thread_name, "Messaging service started");
        *worker = Some(handle);
        Ok(())
    }

    /// Request a connection to `endpoint`; returns immediately
    ///
    /// Starts the worker if needed. A connection or retry schedule already in
    /// progress is abandoned in favor of the new target.
    pub fn connect_socket(&self, endpoint: Endpoint, options: ConnectOptions) -> Result<()> {
        self.start()?;
        info!(
            %endpoint,
            retry_interval_ms = options.retry_interval.as_millis() as u64,
            max_retry_attempts = ?options.max_retry_attempts,
            "Connect requested"
        );
        self.command_tx
            .send(WorkerCommand::Connect { endpoint, options })
            .map_err(|_| TransportError::shutdown("worker is not running"))
    }

    /// Connect using the service's default options
    pub fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.connect_socket(endpoint, self.config.connect_defaults.clone())
    }

    /// Enqueue a packet for transmission; never blocks
    ///
    /// Packets queue while disconnected and are written in call order once a
    /// connection is up.
    pub fn send(&self, packet: impl Into<DataPacket>) -> std::result::Result<(), SendError> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(SendError::Stopped);
        }

        match self.config.queue_capacity {
            Some(capacity) => {
                self.shared
                    .pending
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < capacity).then_some(n + 1)
                    })
                    .map_err(|_| SendError::QueueFull { capacity })?;
            }
            None => {
                self.shared.pending.fetch_add(1, Ordering::SeqCst);
            }
        }

        self.command_tx
            .send(WorkerCommand::Send(packet.into()))
            .map_err(|_| {
                self.shared.release_pending(1);
                SendError::Stopped
            })
    }

    /// Enqueue raw bytes as an untagged packet
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) -> std::result::Result<(), SendError> {
        self.send(DataPacket::new(bytes))
    }

    /// Register for link events
    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Stop the worker and release the socket
    ///
    /// Safe to call from any thread and more than once. Packets still queued
    /// are discarded. Returns after the worker has exited, except when called
    /// from the worker thread itself.
    pub fn stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            info!("Stopping messaging service");
            let _ = self.command_tx.send(WorkerCommand::Stop);
        }

        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            if handle.thread().id() == thread::current().id() {
                warn!("stop called from the worker thread; not joining");
            } else if handle.join().is_err() {
                error!("Messaging worker thread panicked");
            }
        }
        drop(worker);

        // Never started: nothing will drain what was queued
        if self.command_rx.lock().take().is_some() {
            self.shared.pending.store(0, Ordering::SeqCst);
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_state(LinkState::Stopped);
    }

    pub fn state(&self) -> LinkState {
        *self.shared.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Packets accepted but not yet written
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

impl Default for MessagingService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessagingService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("pending", &self.pending_count())
            .finish()
    }
}
