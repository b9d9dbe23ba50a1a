//! TCP links.
//!
//! One connection per configured destination, opened at startup with a
//! connect timeout and OS keepalive. The write half lives behind an
//! async mutex for the dispatcher; the read half feeds the shared frame
//! splitter in a background task. [`StreamTransport`] carries the send
//! side for any stream link, so the TLS module reuses it.

use crate::frame::spawn_read_loop;
use crate::{InboundFrame, LinkOptions, StatsSnapshot, Transport, TransportError, TransportStats};
use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use vigiltak_core::LinkUrl;

const KEEPALIVE_TIME: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Send side of a stream link plus the handle of its read task.
pub struct StreamTransport<W> {
    url: LinkUrl,
    writer: Mutex<W>,
    send_timeout: Duration,
    stats: Arc<TransportStats>,
    read_task: JoinHandle<()>,
}

impl<W> StreamTransport<W> {
    pub(crate) fn new(
        url: LinkUrl,
        writer: W,
        send_timeout: Duration,
        stats: Arc<TransportStats>,
        read_task: JoinHandle<()>,
    ) -> Self {
        Self {
            url,
            writer: Mutex::new(writer),
            send_timeout,
            stats,
            read_task,
        }
    }
}

#[async_trait]
impl<W> Transport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn url(&self) -> &LinkUrl {
        &self.url
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };
        match timeout(self.send_timeout, write).await {
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
            Ok(Ok(())) => {
                self.stats.record_send(frame.len());
                Ok(())
            }
        }
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<W> Drop for StreamTransport<W> {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

pub type TcpTransport = StreamTransport<tokio::net::tcp::OwnedWriteHalf>;

pub async fn connect_tcp(
    url: LinkUrl,
    options: &LinkOptions,
    inbound: flume::Sender<InboundFrame>,
) -> Result<TcpTransport, TransportError> {
    let stream = establish_tcp(&url.addr(), options.connect_timeout).await?;
    let (read_half, write_half) = stream.into_split();

    let stats = Arc::new(TransportStats::default());
    let read_task = spawn_read_loop(
        read_half,
        url.to_string(),
        options.read_timeout,
        inbound,
        Arc::clone(&stats),
    );

    debug!(link = %url, "tcp link ready");
    Ok(StreamTransport::new(
        url,
        write_half,
        options.send_timeout,
        stats,
        read_task,
    ))
}

/// Connects with a deadline and applies socket options shared with TLS.
pub(crate) async fn establish_tcp(
    addr: &str,
    connect_timeout: Duration,
) -> Result<TcpStream, TransportError> {
    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            addr: addr.to_string(),
            timeout: connect_timeout,
        })?
        .map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;

    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
    Ok(stream)
}
