//! End-to-end pipeline tests over loopback sockets.

use chrono::Utc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;
use vigiltak_core::{ImageryConfig, LinkUrl, SentinelConfig, SurveyConfig, VisionConfig};
use vigiltak_cot::{decode, serialize_event, CotEvent, Point};
use vigiltak_net::LinkOptions;
use vigiltak_relay::{
    build_probe, run_router, select_wire_format, Dispatcher, ImageryWorker, LinkTarget, Outcome,
    ReportIdentity, Router,
};
use vigiltak_vision::VisionClient;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe goes out through the dispatcher, a peer echoes it back, and
/// the router answers the echo with the canned site report.
#[tokio::test]
async fn full_probe_loop_over_udp() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let url = LinkUrl::parse(&format!(
        "udp://127.0.0.1:{}",
        peer.local_addr().unwrap().port()
    ))
    .unwrap();

    let (in_tx, in_rx) = flume::bounded(8);
    let (out_tx, out_rx) = flume::bounded(8);
    let transport = vigiltak_net::connect(&url, &LinkOptions::default(), in_tx)
        .await
        .unwrap();
    let format = select_wire_format(&url, Some(2));
    tokio::spawn(Dispatcher::new(vec![LinkTarget { transport, format }]).run(out_rx));

    let router = Router::new(&SentinelConfig::default(), &SurveyConfig::default());
    tokio::spawn(run_router(router, in_rx, out_tx.clone()));

    let survey = SurveyConfig::default();
    out_tx
        .send_async(build_probe("AutoCV1", &survey, 20))
        .await
        .unwrap();

    let mut buf = vec![0u8; 65_535];
    let (n, from) = timeout(RECV_TIMEOUT, peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let probe = decode(&buf[..n]).unwrap();
    assert_eq!(probe.uid, "AutoCV1");
    assert_eq!(probe.event_type, "b-x-cv");

    // Echo the probe back to the agent's socket.
    peer.send_to(&buf[..n], from).await.unwrap();

    let (n, _) = timeout(RECV_TIMEOUT, peer.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = decode(&buf[..n]).unwrap();
    assert_eq!(reply.uid, "6thMan");
    assert_eq!(reply.event_type, "a-s-G");
    assert_eq!(reply.point.lat, -27.456604);
}

/// A short-lived track disappears once its stale time really passes.
#[tokio::test]
async fn stale_track_is_swept_after_expiry() {
    let mut router = Router::new(&SentinelConfig::default(), &SurveyConfig::default());
    let event = CotEvent::new(
        "X1",
        "a-f-G",
        "m-g",
        Point::new(1.0, 2.0, 0.0),
        chrono::Duration::milliseconds(1000),
    );
    let ingestion = router.ingest(serialize_event(&event).as_bytes(), Utc::now());
    assert!(matches!(ingestion.outcome, Outcome::Stored { fresh: true, .. }));
    assert_eq!(router.track_count(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let follow_up = CotEvent::new(
        "X2",
        "a-f-G",
        "m-g",
        Point::new(1.0, 2.0, 0.0),
        chrono::Duration::seconds(60),
    );
    let ingestion = router.ingest(serialize_event(&follow_up).as_bytes(), Utc::now());
    assert_eq!(ingestion.expired, vec!["X1".to_string()]);
    assert!(router.tracks().get("X1").is_none());
    assert!(router.tracks().get("X2").is_some());
}

/// Serves exactly one chat-completions request with a canned reply.
async fn serve_one_completion(listener: TcpListener, content: String) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed before sending a full request");
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse().unwrap())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&tmp[..n]);
    }

    // The request should carry the image as a data URL.
    let body = String::from_utf8_lossy(&buf[header_end..]);
    assert!(body.contains("data:image/png;base64,"));

    let reply = serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
    .to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.len(),
        reply
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
}

/// One oneshot imagery pass: unsupported files are skipped, the image
/// is assessed by the (mock) vision endpoint and the translated report
/// lands on the outbound queue.
#[tokio::test]
async fn imagery_pipeline_produces_reports() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!(
        "http://{}/v1/chat/completions",
        listener.local_addr().unwrap()
    );
    let server = tokio::spawn(serve_one_completion(
        listener,
        r#"{"peopleCount": 2, "hostiles": true, "weaponsDetected": true, "Hazards": false, "rubble": true}"#.to_string(),
    ));

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
    std::fs::write(dir.path().join("scene.png"), b"\x89PNG\r\n\x1a\nfake").unwrap();

    let config = ImageryConfig {
        enabled: true,
        watch_dir: dir.path().to_path_buf(),
        rescan_interval_secs: 30,
        oneshot: true,
        stale_secs: 5,
        patrol_lat: -27.4698,
        patrol_lon: 153.0251,
    };
    let vision = VisionConfig {
        endpoint,
        api_key: Some("token-abc123".to_string()),
        model: "gemma3:27b".to_string(),
        timeout_secs: 10,
    };
    let client = VisionClient::new(vision).unwrap();

    let (out_tx, out_rx) = flume::bounded(8);
    let worker = ImageryWorker::new(
        config,
        client,
        ReportIdentity::new("VIKING1", "Alpha"),
        out_tx,
    );
    timeout(RECV_TIMEOUT, worker.run()).await.unwrap();
    server.await.unwrap();

    let event = out_rx.recv_async().await.unwrap();
    assert!(event.uid.starts_with("VIKING1-"));
    assert_eq!(event.event_type, "a-s-G");
    assert_eq!(event.how, "m-g");
    // First patrol step from the configured start.
    assert_eq!(event.point.lat, -27.469692);
    assert_eq!(event.point.lon, 153.02528);
    assert_eq!(event.point.hae, 26.0);
    assert_eq!(event.point.ce, 999.99);
    assert_eq!(event.point.le, 999_999.99);
    assert_eq!(event.detail.get("peopleCount").map(String::as_str), Some("2"));
    assert_eq!(event.detail.get("hostiles").map(String::as_str), Some("true"));
    assert_eq!(event.detail.get("rubble").map(String::as_str), Some("true"));
    assert_eq!(event.detail.get("callsign").map(String::as_str), Some("VIKING1"));
    assert_eq!(event.detail.get("team").map(String::as_str), Some("Alpha"));

    // The text file produced nothing.
    assert!(out_rx.try_recv().is_err());
}
