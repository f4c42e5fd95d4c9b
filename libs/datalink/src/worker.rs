//! Worker loop
//!
//! Owns the connection, the retry schedule and the pending outbound queue.
//! Each turn waits on the command channel for at most the time until the
//! next scheduled action, then connects, flushes and polls in that order.

use crate::config::ConnectOptions;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::message::DataPacket;
use crate::retry::{RetrySchedule, RetryStep};
use crate::service::{LinkEvent, LinkState, SharedState};
use crate::transports::{ReceiveOutcome, TcpConnection};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Messages from the service handle to its worker
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Connect {
        endpoint: Endpoint,
        options: ConnectOptions,
    },
    Send(DataPacket),
    Stop,
}

/// Connect target and its attempt bookkeeping
struct Target {
    endpoint: Endpoint,
    options: ConnectOptions,
    schedule: RetrySchedule,
}

impl Target {
    fn new(endpoint: Endpoint, options: ConnectOptions) -> Self {
        let schedule = RetrySchedule::new(options.retry_interval, options.max_retry_attempts);
        Self {
            endpoint,
            options,
            schedule,
        }
    }
}

pub(crate) struct Worker {
    commands: Receiver<WorkerCommand>,
    shared: Arc<SharedState>,
    idle_wait: Duration,
    /// Accepted packets not yet written, oldest first
    pending: VecDeque<DataPacket>,
    target: Option<Target>,
    connection: Option<TcpConnection>,
    stop_requested: bool,
}

impl Worker {
    pub(crate) fn new(
        commands: Receiver<WorkerCommand>,
        shared: Arc<SharedState>,
        idle_wait: Duration,
    ) -> Self {
        Self {
            commands,
            shared,
            idle_wait,
            pending: VecDeque::new(),
            target: None,
            connection: None,
            stop_requested: false,
        }
    }

    pub(crate) fn run(mut self) {
        info!("Messaging worker started");

        while !self.stop_requested {
            let wait = self.next_wait();
            self.wait_for_commands(wait);
            if self.stop_requested {
                break;
            }

            self.drive_connect();
            self.flush_pending();
            self.poll_inbound();
        }

        self.shutdown();
    }

    /// How long the command wait may block this turn
    fn next_wait(&self) -> Duration {
        // Connected: the receive poll already bounds the turn
        if self.connection.is_some() {
            return Duration::ZERO;
        }
        self.target
            .as_ref()
            .and_then(|target| target.schedule.time_until_next(Instant::now()))
            .map_or(self.idle_wait, |due| due.min(self.idle_wait))
    }

    fn wait_for_commands(&mut self, wait: Duration) {
        let first = if wait.is_zero() {
            match self.commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    self.stop_requested = true;
                    None
                }
            }
        } else {
            match self.commands.recv_timeout(wait) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.stop_requested = true;
                    None
                }
            }
        };

        if let Some(command) = first {
            self.handle_command(command);
            while !self.stop_requested {
                match self.commands.try_recv() {
                    Ok(command) => self.handle_command(command),
                    Err(_) => break,
                }
            }
        }
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Connect { endpoint, options } => {
                if let Some(connection) = self.connection.take() {
                    let peer = connection.peer_addr();
                    connection.close();
                    self.shared.metrics.record_disconnect();
                    self.shared.publish(LinkEvent::Disconnected {
                        peer,
                        reason: format!("superseded by connect to {}", endpoint),
                    });
                }
                info!(%endpoint, framing = options.framing.name(), "New connect target");
                self.target = Some(Target::new(endpoint, options.normalized()));
                self.shared.set_state(LinkState::Connecting);
            }
            WorkerCommand::Send(packet) => {
                self.pending.push_back(packet);
            }
            WorkerCommand::Stop => {
                debug!("Stop command received");
                self.stop_requested = true;
            }
        }
    }

    /// Make one connect attempt if one is due
    fn drive_connect(&mut self) {
        if self.connection.is_some() {
            return;
        }
        let Some(target) = self.target.as_mut() else {
            return;
        };

        match target.schedule.poll(Instant::now()) {
            RetryStep::Wait(_) | RetryStep::Idle => {}
            RetryStep::Attempt(attempt) => {
                self.shared.metrics.record_connect_attempt();
                self.shared.publish(LinkEvent::Connecting {
                    endpoint: target.endpoint.clone(),
                    attempt,
                });

                match TcpConnection::try_connect(&target.endpoint, &target.options) {
                    Ok(connection) => {
                        let peer = connection.peer_addr();
                        info!(endpoint = %target.endpoint, %peer, attempt, "Connected");
                        self.shared.metrics.record_connected();
                        self.shared.set_state(LinkState::Connected);
                        self.shared.publish(LinkEvent::Connected {
                            endpoint: target.endpoint.clone(),
                            peer,
                        });
                        self.connection = Some(connection);
                    }
                    Err(e) => {
                        warn!(
                            endpoint = %target.endpoint,
                            attempt,
                            retry_in_ms = target.schedule.interval().as_millis() as u64,
                            error = %e,
                            "Connect attempt failed"
                        );
                        self.shared.metrics.record_connect_failure();
                        self.shared.metrics.record_error(e.category());
                        target.schedule.record_failure(Instant::now());
                        self.shared.publish(LinkEvent::ConnectAttemptFailed {
                            endpoint: target.endpoint.clone(),
                            attempt,
                            error: e.to_string(),
                        });
                    }
                }
            }
            RetryStep::Exhausted(attempts) => {
                error!(endpoint = %target.endpoint, attempts, "Giving up on connection");
                let endpoint = target.endpoint.clone();
                self.target = None;
                self.shared.set_state(LinkState::Failed);
                self.shared
                    .publish(LinkEvent::ConnectionFailed { endpoint, attempts });
            }
        }
    }

    /// Write pending packets in order, one write per packet
    fn flush_pending(&mut self) {
        let failure = {
            let Some(connection) = self.connection.as_mut() else {
                return;
            };

            let mut failure = None;
            while let Some(packet) = self.pending.pop_front() {
                match connection.send_packet(&packet) {
                    Ok(bytes) => {
                        self.shared.release_pending(1);
                        self.shared.metrics.record_send(bytes);
                    }
                    Err(TransportError::Protocol { message }) => {
                        warn!(bytes = packet.len(), reason = %message, "Dropping unframeable packet");
                        self.shared.release_pending(1);
                        self.shared.metrics.record_error("protocol");
                        self.shared.publish(LinkEvent::PacketRejected {
                            packet,
                            reason: message,
                        });
                    }
                    Err(e) => {
                        // Unknown how much reached the peer; resend whole after reconnect
                        self.pending.push_front(packet);
                        failure = Some(e);
                        break;
                    }
                }
            }
            failure
        };

        if let Some(e) = failure {
            self.connection_lost(e);
        }
    }

    /// Poll the socket once and publish complete packets
    fn poll_inbound(&mut self) {
        let outcome = match self.connection.as_mut() {
            Some(connection) => connection.try_receive(),
            None => return,
        };

        match outcome {
            Ok(ReceiveOutcome::WouldBlock) => {}
            Ok(ReceiveOutcome::Data(_)) => self.publish_inbound(),
            Ok(ReceiveOutcome::Closed) => {
                if let Some(peer) = self.connection.as_ref().map(TcpConnection::peer_addr) {
                    self.connection_lost(TransportError::closed(peer));
                }
            }
            Err(e) => {
                if matches!(e, TransportError::BufferOverflow { .. }) {
                    self.shared.publish(LinkEvent::ReceiveError {
                        error: e.to_string(),
                    });
                }
                self.connection_lost(e);
            }
        }
    }

    fn publish_inbound(&mut self) {
        loop {
            let next = match self.connection.as_mut() {
                Some(connection) => connection.next_packet(),
                None => return,
            };

            match next {
                Ok(Some(packet)) => {
                    debug!(bytes = packet.len(), kind = ?packet.kind(), "Received packet");
                    self.shared.metrics.record_receive(packet.len());
                    self.shared.publish(LinkEvent::PacketReceived(packet));
                }
                Ok(None) => return,
                Err(e) => {
                    error!(error = %e, "Inbound framing failed");
                    self.shared.publish(LinkEvent::ReceiveError {
                        error: e.to_string(),
                    });
                    self.connection_lost(e);
                    return;
                }
            }
        }
    }

    /// Drop the live connection and schedule a reconnect to the same target
    fn connection_lost(&mut self, error: TransportError) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let peer = connection.peer_addr();
        connection.close();

        warn!(%peer, error = %error, pending = self.pending.len(), "Connection lost");
        self.shared.metrics.record_disconnect();
        self.shared.metrics.record_error(error.category());

        match self.target.as_mut() {
            Some(target) => {
                target.schedule = RetrySchedule::delayed(
                    target.options.retry_interval,
                    target.options.max_retry_attempts,
                );
                self.shared.set_state(LinkState::Connecting);
            }
            None => self.shared.set_state(LinkState::Idle),
        }
        self.shared.publish(LinkEvent::Disconnected {
            peer,
            reason: error.to_string(),
        });
    }

    fn shutdown(mut self) {
        if let Some(connection) = self.connection.take() {
            let peer = connection.peer_addr();
            connection.close();
            self.shared.metrics.record_disconnect();
            self.shared.publish(LinkEvent::Disconnected {
                peer,
                reason: "service stopped".to_string(),
            });
        }

        while let Ok(command) = self.commands.try_recv() {
            if let WorkerCommand::Send(packet) = command {
                self.pending.push_back(packet);
            }
        }
        if !self.pending.is_empty() {
            warn!(discarded = self.pending.len(), "Discarding unsent packets");
        }
        self.pending.clear();
        self.shared.pending.store(0, Ordering::SeqCst);

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_state(LinkState::Stopped);
        info!("Messaging worker stopped");
    }
}
