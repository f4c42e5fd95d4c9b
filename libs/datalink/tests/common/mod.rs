//! Shared helpers for the loopback integration tests

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use datalink::{ConnectOptions, Endpoint, LinkEvent, RetryLimit};
use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Loopback listener on an ephemeral port
pub fn listener() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = Endpoint::from(listener.local_addr().unwrap());
    (listener, endpoint)
}

/// A loopback port with nothing listening on it
pub fn refused_endpoint() -> Endpoint {
    let (listener, endpoint) = listener();
    drop(listener);
    endpoint
}

/// Fast retry options for tests
pub fn fast_options(interval_ms: u64, attempts: u32) -> ConnectOptions {
    ConnectOptions::default()
        .with_retry_interval(Duration::from_millis(interval_ms))
        .with_max_retry_attempts(RetryLimit::from_raw(attempts))
        .with_connect_timeout(Duration::from_secs(1))
        .with_poll_interval(Duration::from_millis(5))
}

/// Accept one connection or panic after `timeout`
pub fn accept_within(listener: &TcpListener, timeout: Duration) -> TcpStream {
    listener.set_nonblocking(true).unwrap();
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).unwrap();
                stream.set_read_timeout(Some(EVENT_TIMEOUT)).unwrap();
                return stream;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock && Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(2));
            }
            Err(e) => panic!("no connection accepted: {}", e),
        }
    }
}

/// Read exactly `len` bytes
pub fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// Read one length-prefixed frame as `(kind, payload)`
pub fn read_frame(stream: &mut TcpStream) -> (u16, Vec<u8>) {
    let header = read_exact(stream, 6);
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let kind = u16::from_be_bytes([header[4], header[5]]);
    (kind, read_exact(stream, len))
}

/// Wait for the first event matching `pred`, skipping others
pub fn wait_for<F>(events: &Receiver<LinkEvent>, mut pred: F) -> LinkEvent
where
    F: FnMut(&LinkEvent) -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(_) => panic!("timed out waiting for link event"),
        }
    }
}

pub fn wait_connected(events: &Receiver<LinkEvent>) {
    wait_for(events, |e| matches!(e, LinkEvent::Connected { .. }));
}
