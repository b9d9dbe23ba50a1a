//! Outbound fan-out and wire format selection.

use metrics::counter;
use std::time::Duration;
use tracing::{debug, error, warn};
use vigiltak_core::LinkUrl;
use vigiltak_cot::{encode, serialize_event, CotEvent, WireFormat};
use vigiltak_net::Transport;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Picks the wire format for a destination.
///
/// An explicit selector wins: `0` XML, `1` stream-framed protobuf, `2`
/// mesh protobuf. Any other value, or no selector, falls back to the
/// destination shape: multicast groups speak mesh, unicast IPs speak
/// the stream framing, and hostnames get XML for maximum compatibility.
pub fn select_wire_format(url: &LinkUrl, selector: Option<u8>) -> WireFormat {
    match selector {
        Some(0) => WireFormat::Xml,
        Some(1) => WireFormat::StreamBinary,
        Some(2) => WireFormat::MeshBinary,
        _ => {
            if url.is_multicast() {
                WireFormat::MeshBinary
            } else if url.host_ip().is_some() {
                WireFormat::StreamBinary
            } else {
                WireFormat::Xml
            }
        }
    }
}

/// One destination with its negotiated wire format.
pub struct LinkTarget {
    pub transport: Box<dyn Transport>,
    pub format: WireFormat,
}

/// Fans every outbound event out to all links.
pub struct Dispatcher {
    links: Vec<LinkTarget>,
}

impl Dispatcher {
    pub fn new(links: Vec<LinkTarget>) -> Self {
        Self { links }
    }

    /// Drains the outbound queue until every sender is gone.
    pub async fn run(self, outbound: flume::Receiver<CotEvent>) {
        let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
        stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; swallow it.
        stats_tick.tick().await;

        loop {
            tokio::select! {
                event = outbound.recv_async() => match event {
                    Ok(event) => self.broadcast(&event).await,
                    Err(_) => break,
                },
                _ = stats_tick.tick() => self.log_stats(),
            }
        }
        debug!("outbound queue closed, dispatcher stopping");
    }

    async fn broadcast(&self, event: &CotEvent) {
        for link in &self.links {
            let bytes = match encode(event, link.format) {
                Ok(bytes) => bytes,
                Err(e) => {
                    // Details that refuse binary transcoding still go
                    // out, as XML.
                    warn!(
                        link = %link.transport.url(),
                        uid = %event.uid,
                        error = %e,
                        "binary encode failed, falling back to xml"
                    );
                    counter!("vigiltak_transcode_fallbacks_total").increment(1);
                    serialize_event(event).into_bytes()
                }
            };

            match link.transport.send(&bytes).await {
                Ok(()) => {
                    counter!("vigiltak_events_sent_total").increment(1);
                }
                Err(e) if e.is_transient() => {
                    counter!("vigiltak_send_errors_total").increment(1);
                    warn!(link = %link.transport.url(), error = %e, "send failed");
                }
                Err(e) => {
                    counter!("vigiltak_send_errors_total").increment(1);
                    error!(link = %link.transport.url(), error = %e, "send failed");
                }
            }
        }
    }

    fn log_stats(&self) {
        for link in &self.links {
            let s = link.transport.stats();
            debug!(
                link = %link.transport.url(),
                frames_sent = s.frames_sent,
                frames_received = s.frames_received,
                bytes_sent = s.bytes_sent,
                bytes_received = s.bytes_received,
                send_errors = s.send_errors,
                "link stats"
            );
        }
    }
}
