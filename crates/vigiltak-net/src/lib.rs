//! Link transports for CoT traffic.
//!
//! Every configured destination becomes one bidirectional link:
//!
//! - `udp://` sends datagrams and, for multicast groups, joins the group
//!   and receives on the same socket
//! - `tcp://` holds a stream connection with keepalive
//! - `tls://` wraps the same stream handling in rustls
//!
//! Received frames are pushed into a bounded inbound channel handed over
//! at construction; sending goes through the [`Transport`] trait with a
//! hard timeout so one stalled link cannot wedge the dispatcher.

pub mod frame;
pub mod tcp;
pub mod tls;
pub mod udp;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use vigiltak_core::{LinkScheme, LinkUrl};

pub use frame::{extract_frame, MAX_FRAME_SIZE};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("address '{0}' did not resolve")]
    Resolve(String),

    #[error("TLS setup for {addr} failed: {reason}")]
    Tls { addr: String, reason: String },

    #[error("certificate material rejected: {0}")]
    Certificate(String),

    #[error("send on {link} timed out after {timeout:?}")]
    SendTimeout { link: String, timeout: Duration },

    #[error("send on {link} failed: {source}")]
    Send {
        link: String,
        #[source]
        source: std::io::Error,
    },

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed frame on link")]
    BadFrame,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether retrying the same operation later could succeed. Broken
    /// certificates and bad addresses stay broken; timeouts and socket
    /// errors come and go.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. }
                | TransportError::ConnectTimeout { .. }
                | TransportError::SendTimeout { .. }
                | TransportError::Send { .. }
                | TransportError::Io(_)
        )
    }
}

/// One raw frame received from a link, still in its wire framing.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Display form of the link URL the frame arrived on.
    pub link: String,
    pub payload: Bytes,
}

/// Send/receive counters for one link. Receive-side updates come from
/// the link's read task, so everything is atomic.
#[derive(Debug, Default)]
pub struct TransportStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_errors: AtomicU64,
}

impl TransportStats {
    pub fn record_send(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_receive(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
}

/// Timeouts and certificate material shared by every link the agent
/// opens.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub send_timeout: Duration,
    pub multicast_ttl: u32,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(5),
            multicast_ttl: 4,
            ca_cert: None,
            client_cert: None,
            client_key: None,
        }
    }
}

/// A live bidirectional link. Receiving runs in a background task owned
/// by the transport; dropping the transport tears it down.
#[async_trait]
pub trait Transport: Send + Sync {
    fn url(&self) -> &LinkUrl;

    /// Sends one already-encoded frame, bounded by the send timeout.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    fn stats(&self) -> StatsSnapshot;
}

/// Opens the transport matching the URL scheme.
pub async fn connect(
    url: &LinkUrl,
    options: &LinkOptions,
    inbound: flume::Sender<InboundFrame>,
) -> Result<Box<dyn Transport>, TransportError> {
    match url.scheme {
        LinkScheme::Udp => Ok(Box::new(
            udp::UdpTransport::connect(url.clone(), options, inbound).await?,
        )),
        LinkScheme::Tcp => Ok(Box::new(
            tcp::connect_tcp(url.clone(), options, inbound).await?,
        )),
        LinkScheme::Tls => Ok(Box::new(
            tls::connect_tls(url.clone(), options, inbound).await?,
        )),
    }
}
