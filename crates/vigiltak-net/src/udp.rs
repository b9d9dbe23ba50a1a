//! UDP links.
//!
//! A unicast link binds an ephemeral port and sends datagrams at the
//! peer. A multicast link binds the group port with address reuse, joins
//! the group and receives everything published on it, which makes it the
//! usual mesh-SA party line. Each datagram is one frame; no stream
//! framing applies.

use crate::{InboundFrame, LinkOptions, StatsSnapshot, Transport, TransportError, TransportStats};
use async_trait::async_trait;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use vigiltak_core::LinkUrl;

/// Largest payload that fits a typical ethernet MTU. Oversized sends
/// still go out but are worth noticing on mesh links.
pub const MAX_UDP_PAYLOAD: usize = 1472;

const RECV_BUFFER_SIZE: usize = 65_535;

pub struct UdpTransport {
    url: LinkUrl,
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    send_timeout: Duration,
    stats: Arc<TransportStats>,
    recv_task: JoinHandle<()>,
}

impl UdpTransport {
    pub async fn connect(
        url: LinkUrl,
        options: &LinkOptions,
        inbound: flume::Sender<InboundFrame>,
    ) -> Result<Self, TransportError> {
        let remote = tokio::net::lookup_host(url.addr())
            .await
            .map_err(|e| TransportError::Connect {
                addr: url.addr(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::Resolve(url.addr()))?;

        let multicast = remote.ip().is_multicast();
        let socket = build_socket(remote, multicast, options.multicast_ttl)?;
        let socket = Arc::new(socket);

        let stats = Arc::new(TransportStats::default());
        let recv_task = spawn_recv_loop(
            Arc::clone(&socket),
            url.to_string(),
            inbound,
            Arc::clone(&stats),
        );

        debug!(link = %url, multicast, "udp link ready");
        Ok(Self {
            url,
            socket,
            remote,
            send_timeout: options.send_timeout,
            stats,
            recv_task,
        })
    }
}

/// Raw socket construction runs through socket2: tokio's bind cannot set
/// address reuse before binding, which multicast receivers need.
fn build_socket(
    remote: SocketAddr,
    multicast: bool,
    ttl: u32,
) -> Result<UdpSocket, TransportError> {
    let domain = if remote.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    // Multicast receivers bind the group port; unicast senders take an
    // ephemeral one.
    let bind_addr: SocketAddr = match (remote, multicast) {
        (SocketAddr::V4(_), true) => (Ipv4Addr::UNSPECIFIED, remote.port()).into(),
        (SocketAddr::V4(_), false) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        (SocketAddr::V6(_), true) => (Ipv6Addr::UNSPECIFIED, remote.port()).into(),
        (SocketAddr::V6(_), false) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket.bind(&bind_addr.into())?;

    if multicast {
        match remote.ip() {
            IpAddr::V4(group) => {
                socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
                socket.set_multicast_ttl_v4(ttl)?;
                // Without this the agent would ingest its own probes.
                socket.set_multicast_loop_v4(false)?;
            }
            IpAddr::V6(group) => {
                socket.join_multicast_v6(&group, 0)?;
                socket.set_multicast_loop_v6(false)?;
            }
        }
    }

    UdpSocket::from_std(socket.into()).map_err(TransportError::Io)
}

fn spawn_recv_loop(
    socket: Arc<UdpSocket>,
    link: String,
    inbound: flume::Sender<InboundFrame>,
    stats: Arc<TransportStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, _from)) => {
                    stats.record_receive(n);
                    let msg = InboundFrame {
                        link: link.clone(),
                        payload: Bytes::copy_from_slice(&buf[..n]),
                    };
                    if inbound.send_async(msg).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(link = %link, error = %e, "udp receive error, closing receive side");
                    return;
                }
            }
        }
    })
}

#[async_trait]
impl Transport for UdpTransport {
    fn url(&self) -> &LinkUrl {
        &self.url
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_UDP_PAYLOAD {
            debug!(
                link = %self.url,
                size = frame.len(),
                "datagram exceeds typical MTU"
            );
        }
        match timeout(self.send_timeout, self.socket.send_to(frame, self.remote)).await {
            Err(_) => {
                self.stats.record_send_error();
                Err(TransportError::SendTimeout {
                    link: self.url.to_string(),
                    timeout: self.send_timeout,
                })
            }
            Ok(Err(e)) => {
                self.stats.record_send_error();
                Err(TransportError::Send {
                    link: self.url.to_string(),
                    source: e,
                })
            }
            Ok(Ok(_)) => {
                self.stats.record_send(frame.len());
                Ok(())
            }
        }
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}
