//! Messaging service integration tests
//!
//! Every test runs the real worker thread against loopback TCP peers.

mod common;

use common::*;
use datalink::{
    DataPacket, Framing, LinkEvent, LinkState, MessagingService, SendError,
};
use std::io::Write;
use std::num::NonZeroU16;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod ordering {
    use super::*;

    #[test_log::test]
    fn test_sends_before_connect_arrive_in_order() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();

        service.send(DataPacket::from_args(["one"])).unwrap();
        service.send(DataPacket::from_args(["two"])).unwrap();
        service.send(DataPacket::from_args(["three"])).unwrap();
        assert_eq!(service.pending_count(), 3);

        service.connect_socket(endpoint, fast_options(20, 0)).unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);

        let expected = b"one two three ";
        assert_eq!(read_exact(&mut peer, expected.len()), expected);
        service.stop();
    }

    #[test_log::test]
    fn test_concurrent_senders_never_interleave() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 50;

        let (listener, endpoint) = listener();
        let service = Arc::new(MessagingService::new());
        service
            .connect_socket(
                endpoint,
                fast_options(20, 0).with_framing(Framing::length_prefixed()),
            )
            .unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);

        let senders: Vec<_> = (0..THREADS)
            .map(|t| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        // Long enough that a torn write would be visible
                        let payload = format!("{}:{:04}:", t, i).repeat(64);
                        service.send(DataPacket::from_text(&payload)).unwrap();
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }

        let mut next_index = [0usize; THREADS];
        for _ in 0..THREADS * PER_THREAD {
            let (kind, payload) = read_frame(&mut peer);
            assert_eq!(kind, 0);
            let text = String::from_utf8(payload).unwrap();
            let unit = &text[..7];
            assert_eq!(text, unit.repeat(64), "packet bytes were interleaved");

            let t: usize = unit[..1].parse().unwrap();
            let i: usize = unit[2..6].parse().unwrap();
            assert_eq!(i, next_index[t], "per-thread order was not preserved");
            next_index[t] += 1;
        }
        assert_eq!(next_index, [PER_THREAD; THREADS]);
        service.stop();
    }

    #[test_log::test]
    fn test_reconnect_preserves_queued_packets() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();

        service.connect_socket(endpoint, fast_options(20, 0)).unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);
        wait_connected(&events);

        service.send(DataPacket::from_args(["first"])).unwrap();
        assert_eq!(read_exact(&mut peer, 6), b"first ");

        // Peer drops mid-session
        drop(peer);
        wait_for(&events, |e| matches!(e, LinkEvent::Disconnected { .. }));
        assert_eq!(service.state(), LinkState::Connecting);

        service.send(DataPacket::from_args(["second"])).unwrap();
        service.send(DataPacket::from_args(["third"])).unwrap();

        let mut peer = accept_within(&listener, EVENT_TIMEOUT);
        let expected = b"second third ";
        assert_eq!(read_exact(&mut peer, expected.len()), expected);
        assert_eq!(service.metrics().connections, 2);
        service.stop();
    }

    #[test_log::test]
    fn test_queue_survives_connection_failure() {
        let service = MessagingService::new();
        let events = service.subscribe();
        service.send(DataPacket::from_args(["kept"])).unwrap();

        service
            .connect_socket(refused_endpoint(), fast_options(5, 1))
            .unwrap();
        wait_for(&events, |e| matches!(e, LinkEvent::ConnectionFailed { .. }));
        assert_eq!(service.state(), LinkState::Failed);
        assert_eq!(service.pending_count(), 1);

        let (listener, endpoint) = listener();
        service.connect_socket(endpoint, fast_options(5, 1)).unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);
        assert_eq!(read_exact(&mut peer, 5), b"kept ");
        service.stop();
    }
}

mod retry {
    use super::*;

    fn count_failures_until_done(
        events: &crossbeam_channel::Receiver<LinkEvent>,
    ) -> (u32, LinkEvent) {
        let mut failures = 0;
        loop {
            match wait_for(events, |_| true) {
                LinkEvent::ConnectAttemptFailed { attempt, .. } => {
                    failures += 1;
                    assert_eq!(attempt, failures);
                }
                done @ (LinkEvent::Connected { .. } | LinkEvent::ConnectionFailed { .. }) => {
                    return (failures, done)
                }
                _ => {}
            }
        }
    }

    #[test_log::test]
    fn test_unreachable_endpoint_fails_after_budget() {
        let service = MessagingService::new();
        let events = service.subscribe();

        let started = Instant::now();
        service
            .connect_socket(refused_endpoint(), fast_options(10, 3))
            .unwrap();
        let (failures, done) = count_failures_until_done(&events);
        let elapsed = started.elapsed();

        assert_eq!(failures, 3);
        assert!(matches!(done, LinkEvent::ConnectionFailed { attempts: 3, .. }));
        assert!(elapsed >= Duration::from_millis(30), "gave up after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(200), "gave up after {:?}", elapsed);
        assert_eq!(service.state(), LinkState::Failed);

        let metrics = service.metrics();
        assert_eq!(metrics.connect_attempts, 3);
        assert_eq!(metrics.connect_failures, 3);
        service.stop();
    }

    /// Refuse `refusals` attempts, then start listening
    fn refuse_then_accept(refusals: u32, budget: u32) -> (u32, LinkEvent) {
        let endpoint = refused_endpoint();
        let service = MessagingService::new();
        let events = service.subscribe();
        service
            .connect_socket(endpoint.clone(), fast_options(50, budget))
            .unwrap();

        let mut failures = 0;
        let mut listener = None;
        let done = loop {
            match wait_for(&events, |_| true) {
                LinkEvent::ConnectAttemptFailed { .. } => {
                    failures += 1;
                    if failures == refusals {
                        listener = Some(
                            std::net::TcpListener::bind(endpoint.to_string()).unwrap(),
                        );
                    }
                }
                done @ (LinkEvent::Connected { .. } | LinkEvent::ConnectionFailed { .. }) => {
                    break done
                }
                _ => {}
            }
        };
        service.stop();
        drop(listener);
        (failures, done)
    }

    #[test_log::test]
    fn test_connects_when_budget_covers_refusals() {
        let (failures, done) = refuse_then_accept(2, 3);
        assert_eq!(failures, 2);
        assert!(matches!(done, LinkEvent::Connected { .. }));
    }

    #[test_log::test]
    fn test_fails_when_budget_equals_refusals() {
        let (failures, done) = refuse_then_accept(2, 2);
        assert_eq!(failures, 2);
        assert!(matches!(done, LinkEvent::ConnectionFailed { attempts: 2, .. }));
    }

    #[test_log::test]
    fn test_unlimited_budget_keeps_trying() {
        let service = MessagingService::new();
        let events = service.subscribe();
        service
            .connect_socket(refused_endpoint(), fast_options(1, 0))
            .unwrap();

        wait_for(&events, |e| {
            matches!(e, LinkEvent::ConnectAttemptFailed { attempt, .. } if *attempt >= 10)
        });
        assert_eq!(service.state(), LinkState::Connecting);
        service.stop();
    }

    #[test_log::test]
    fn test_stop_interrupts_long_retry_wait() {
        let service = MessagingService::new();
        let events = service.subscribe();
        service
            .connect_socket(refused_endpoint(), fast_options(30_000, 0))
            .unwrap();
        wait_for(&events, |e| matches!(e, LinkEvent::ConnectAttemptFailed { .. }));

        let started = Instant::now();
        service.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(service.state(), LinkState::Stopped);
        assert_eq!(service.send("late"), Err(SendError::Stopped));
    }
}

mod lifecycle {
    use super::*;

    #[test_log::test]
    fn test_superseding_connect_replaces_connection() {
        let (first_listener, first) = listener();
        let (second_listener, second) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();

        service.connect_socket(first, fast_options(20, 0)).unwrap();
        let mut first_peer = accept_within(&first_listener, EVENT_TIMEOUT);
        wait_connected(&events);

        service
            .connect_socket(second.clone(), fast_options(20, 0))
            .unwrap();
        wait_for(&events, |e| matches!(e, LinkEvent::Disconnected { .. }));
        let connected = wait_for(&events, |e| matches!(e, LinkEvent::Connected { .. }));
        assert!(matches!(connected, LinkEvent::Connected { endpoint, .. } if endpoint == second));

        let mut second_peer = accept_within(&second_listener, EVENT_TIMEOUT);
        service.send("to second").unwrap();
        assert_eq!(read_exact(&mut second_peer, 9), b"to second");

        // Old connection was closed
        let mut buf = [0u8; 1];
        assert_eq!(std::io::Read::read(&mut first_peer, &mut buf).unwrap(), 0);
        service.stop();
    }

    #[test_log::test]
    fn test_stop_releases_socket() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();
        service.connect_socket(endpoint, fast_options(20, 0)).unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);
        wait_connected(&events);

        service.stop();
        let mut buf = [0u8; 1];
        assert_eq!(std::io::Read::read(&mut peer, &mut buf).unwrap(), 0);
        assert!(matches!(
            events.try_iter().last(),
            Some(LinkEvent::Disconnected { .. })
        ));
    }

    #[test_log::test]
    fn test_drop_stops_worker() {
        let (listener, endpoint) = listener();
        let events;
        {
            let service = MessagingService::new();
            events = service.subscribe();
            service.connect_socket(endpoint, fast_options(20, 0)).unwrap();
            let _peer = accept_within(&listener, EVENT_TIMEOUT);
            wait_connected(&events);
        }
        // Worker exited and dropped its subscriber senders
        let deadline = Instant::now() + EVENT_TIMEOUT;
        loop {
            match events.recv_deadline(deadline) {
                Ok(_) => continue,
                Err(e) => {
                    assert_eq!(e, crossbeam_channel::RecvTimeoutError::Disconnected);
                    break;
                }
            }
        }
    }
}

mod inbound {
    use super::*;

    #[test_log::test]
    fn test_length_prefixed_packets_are_published() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();
        service
            .connect_socket(
                endpoint,
                fast_options(20, 0).with_framing(Framing::length_prefixed()),
            )
            .unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);

        // Two frames, the second split across writes
        peer.write_all(&[0, 0, 0, 2, 0, 7, b'h', b'i']).unwrap();
        peer.write_all(&[0, 0, 0, 3, 0]).unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        peer.write_all(&[0, b'y', b'o', b'u']).unwrap();

        let first = wait_for(&events, |e| matches!(e, LinkEvent::PacketReceived(_)));
        let second = wait_for(&events, |e| matches!(e, LinkEvent::PacketReceived(_)));
        assert_eq!(
            first,
            LinkEvent::PacketReceived(DataPacket::with_kind(&b"hi"[..], NonZeroU16::new(7).unwrap()))
        );
        assert_eq!(second, LinkEvent::PacketReceived(DataPacket::from_text("you")));
        assert_eq!(service.metrics().packets_received, 2);
        service.stop();
    }

    #[test_log::test]
    fn test_raw_bytes_are_published_in_order() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();
        service.connect_socket(endpoint, fast_options(20, 0)).unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);

        peer.write_all(b"hello world").unwrap();

        let mut received = Vec::new();
        while received.len() < 11 {
            if let LinkEvent::PacketReceived(packet) =
                wait_for(&events, |e| matches!(e, LinkEvent::PacketReceived(_)))
            {
                received.extend_from_slice(packet.as_bytes());
            }
        }
        assert_eq!(received, b"hello world");
        service.stop();
    }

    #[test_log::test]
    fn test_frame_larger_than_buffer_drops_connection() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();
        service
            .connect_socket(
                endpoint,
                fast_options(20, 0)
                    .with_framing(Framing::length_prefixed())
                    .with_receive_buffer_size(64),
            )
            .unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);

        peer.write_all(&[0, 0, 0, 200, 0, 0]).unwrap();

        let error = wait_for(&events, |e| matches!(e, LinkEvent::ReceiveError { .. }));
        assert!(matches!(error, LinkEvent::ReceiveError { error } if error.contains("overflow")));
        wait_for(&events, |e| matches!(e, LinkEvent::Disconnected { .. }));
        assert_eq!(
            service.metrics().error_types.get("buffer_overflow"),
            Some(&1)
        );
        service.stop();
    }

    #[test_log::test]
    fn test_oversized_outbound_packet_is_rejected() {
        let (listener, endpoint) = listener();
        let service = MessagingService::new();
        let events = service.subscribe();
        service
            .connect_socket(
                endpoint,
                fast_options(20, 0).with_framing(Framing::LengthPrefixed { max_frame_size: 4 }),
            )
            .unwrap();
        let mut peer = accept_within(&listener, EVENT_TIMEOUT);
        wait_connected(&events);

        service.send("too long").unwrap();
        service.send("ok").unwrap();

        let rejected = wait_for(&events, |e| matches!(e, LinkEvent::PacketRejected { .. }));
        assert!(matches!(rejected, LinkEvent::PacketRejected { packet, .. } if packet.as_bytes() == b"too long"));
        assert_eq!(read_frame(&mut peer), (0, b"ok".to_vec()));
        assert_eq!(service.state(), LinkState::Connected);
        service.stop();
    }
}
