//! End-to-end agent test over a real UDP link: the agent comes up from
//! plain configuration, beacons its presence probe, and answers a
//! sentinel probe sent back by the peer.

use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use vigiltak_core::AgentConfig;
use vigiltak_cot::{decode, serialize_event, CotEvent, Point};
use vigiltak_relay::Agent;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn recv_event(peer: &UdpSocket) -> (CotEvent, std::net::SocketAddr) {
    let mut buf = vec![0u8; 65_535];
    let (n, from) = timeout(RECV_TIMEOUT, peer.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a frame")
        .expect("receive failed");
    let event = decode(&buf[..n]).expect("frame did not decode");
    (event, from)
}

#[tokio::test(flavor = "multi_thread")]
async fn agent_beacons_and_answers_probes_over_udp() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = peer.local_addr().unwrap().port();

    let config = AgentConfig {
        links: vec![format!("udp://127.0.0.1:{port}")],
        probe: vigiltak_core::ProbeConfig {
            enabled: true,
            interval_secs: 1,
            stale_secs: 20,
        },
        ..AgentConfig::default()
    };
    config.validate().unwrap();
    tokio::spawn(Agent::new(config).run());

    // The beacon fires immediately on startup. A unicast IP destination
    // auto-selects stream framing, which decode() detects.
    let (probe, agent_addr) = recv_event(&peer).await;
    assert_eq!(probe.uid, "AutoCV1");
    assert_eq!(probe.event_type, "b-x-cv");
    assert_eq!(probe.how, "m-g");
    assert_eq!(probe.point.lat, -27.456604);
    assert_eq!(probe.point.lon, 153.037484);

    // Answer with a sentinel probe of our own; the agent owes us the
    // canned site reply.
    let sentinel = CotEvent::new(
        "team4test",
        "b-x-cv",
        "m-g",
        Point::new(0.0, 0.0, 0.0),
        chrono::Duration::seconds(20),
    );
    peer.send_to(serialize_event(&sentinel).as_bytes(), agent_addr)
        .await
        .unwrap();

    // The next frames interleave beacon probes with the reply.
    let reply = loop {
        let (event, _) = recv_event(&peer).await;
        if event.uid != "AutoCV1" {
            break event;
        }
    };
    assert_eq!(reply.uid, "6thMan");
    assert_eq!(reply.event_type, "a-s-G");
    assert_eq!(reply.point.lat, -27.456604);
    assert!(reply.detail.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn agent_honors_forced_xml_wire_format() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = peer.local_addr().unwrap().port();

    let config = AgentConfig {
        links: vec![format!("udp://127.0.0.1:{port}")],
        tak_proto: Some(0),
        probe: vigiltak_core::ProbeConfig {
            enabled: true,
            interval_secs: 1,
            stale_secs: 20,
        },
        ..AgentConfig::default()
    };
    tokio::spawn(Agent::new(config).run());

    let mut buf = vec![0u8; 65_535];
    let (n, _) = timeout(RECV_TIMEOUT, peer.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a frame")
        .expect("receive failed");
    let frame = &buf[..n];
    assert!(frame.starts_with(b"<?xml"));
    let event = decode(frame).unwrap();
    assert_eq!(event.uid, "AutoCV1");
}
