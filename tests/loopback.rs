//! End-to-end exchange between two endpoints over loopback UDP.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use netflux::prelude::*;

/// Two distinct ports that were free a moment ago.
fn free_ports() -> (u16, u16) {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();
    (
        a.local_addr().unwrap().port(),
        b.local_addr().unwrap().port(),
    )
}

fn settings(local_port: u16, remote_port: u16) -> Settings {
    NetfluxConfig {
        local_port,
        remote_port,
        payload_size: 8,
        send_interval_us: 1000,
        watchdog_interval_ms: 100,
        ..Default::default()
    }
    .validate()
    .unwrap()
}

#[test]
fn engines_exchange_payloads() {
    let (port_a, port_b) = free_ports();
    let mut a = Engine::new(settings(port_a, port_b), UdpTransport::new());
    let mut b = Engine::new(settings(port_b, port_a), UdpTransport::new());

    let mut counter = 0u64;
    let mut source_a = |buf: &mut [u8]| {
        counter += 1;
        buf.copy_from_slice(&counter.to_le_bytes());
    };
    let mut source_b = |buf: &mut [u8]| buf.copy_from_slice(b"from-b!!");
    let mut last_at_a = Vec::new();
    let mut sink_a = |payload: &[u8]| last_at_a = payload.to_vec();
    let mut sink_b = |_: &[u8]| {};

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        let now = Instant::now();
        a.cycle(now, &mut source_a, &mut sink_a);
        b.cycle(now, &mut source_b, &mut sink_b);
        if b.stats().frames_accepted >= 50 && a.stats().last_rtt.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_micros(500));
    }

    assert_eq!(a.link_state(), LinkState::Up);
    assert_eq!(b.link_state(), LinkState::Up);
    assert_eq!(a.received_payload(), b"from-b!!");
    assert_eq!(last_at_a, b"from-b!!");

    let stats = b.stats();
    assert!(stats.frames_accepted >= 50);
    assert_eq!(stats.total_partner_lost_packets, 0);
    assert_eq!(b.counters().malformed, 0);
    // The last payload seen by b is a counter value a actually sent
    let seen = u64::from_le_bytes(b.received_payload().try_into().unwrap());
    assert!(seen >= 1 && seen <= a.counters().sent);

    let rtt = a.stats().last_rtt.expect("round trip measured");
    assert!(rtt < Duration::from_secs(1));
}

#[test]
fn engine_detects_silent_partner() {
    let (port_a, port_b) = free_ports();
    let mut a = Engine::new(settings(port_a, port_b), UdpTransport::new());
    let mut b = Engine::new(settings(port_b, port_a), UdpTransport::new());
    let mut source = |buf: &mut [u8]| buf.fill(0xAB);
    let mut sink = |_: &[u8]| {};

    let deadline = Instant::now() + Duration::from_secs(5);
    while a.link_state() != LinkState::Up && Instant::now() < deadline {
        let now = Instant::now();
        a.cycle(now, &mut source, &mut sink);
        b.cycle(now, &mut source, &mut sink);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(a.link_state(), LinkState::Up);

    // b goes away; a keeps cycling alone
    drop(b);
    let mut status = a.status();
    let deadline = Instant::now() + Duration::from_secs(5);
    while status != StatusCode::WatchdogTimeout && Instant::now() < deadline {
        status = a.cycle(Instant::now(), &mut source, &mut sink);
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(status, StatusCode::WatchdogTimeout);
    assert_eq!(a.link_state(), LinkState::Down);
    assert_eq!(a.received_payload(), &[0u8; 8]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nodes_exchange_and_recover() {
    let (port_a, port_b) = free_ports();
    let a = Node::spawn(
        settings(port_a, port_b),
        |buf: &mut [u8]| buf.copy_from_slice(b"node-a!!"),
        |_: &[u8]| {},
    );
    let b = Node::spawn(
        settings(port_b, port_a),
        |buf: &mut [u8]| buf.copy_from_slice(b"node-b!!"),
        |_: &[u8]| {},
    );

    let mut stats = a.subscribe_stats();
    tokio::time::timeout(
        Duration::from_secs(5),
        stats.wait_for(|s| s.frames_accepted >= 20 && s.last_rtt.is_some()),
    )
    .await
    .expect("a accepts frames from b")
    .unwrap();
    assert_eq!(a.received_payload(), b"node-b!!");
    assert_eq!(a.link_state(), LinkState::Up);

    // b restarts on the same port: address reuse lets it rebind at once
    b.shutdown().await;
    let mut status = a.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == StatusCode::WatchdogTimeout),
    )
    .await
    .expect("a notices the outage")
    .unwrap();

    let b = Node::spawn(
        settings(port_b, port_a),
        |buf: &mut [u8]| buf.copy_from_slice(b"again-b!"),
        |_: &[u8]| {},
    );
    let deadline = Instant::now() + Duration::from_secs(5);
    while a.received_payload() != b"again-b!" {
        assert!(Instant::now() < deadline, "link never recovered");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(a.link_state(), LinkState::Up);

    // The restarted partner re-seeds the sequence instead of counting loss
    tokio::time::timeout(Duration::from_secs(5), stats.wait_for(|s| s.resync_events >= 1))
        .await
        .expect("resync recorded")
        .unwrap();

    a.shutdown().await;
    b.shutdown().await;
}
