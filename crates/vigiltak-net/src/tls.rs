//! TLS links.
//!
//! Same stream handling as TCP with rustls in the middle. Trust comes
//! from the bundled webpki roots unless the configuration names a CA
//! file, which is the common case against self-signed TAK server
//! infrastructure. Client certificate auth is optional.

use crate::frame::spawn_read_loop;
use crate::tcp::{establish_tcp, StreamTransport};
use crate::{InboundFrame, LinkOptions, TransportError, TransportStats};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use vigiltak_core::LinkUrl;

pub type TlsTransport = StreamTransport<WriteHalf<TlsStream<TcpStream>>>;

pub async fn connect_tls(
    url: LinkUrl,
    options: &LinkOptions,
    inbound: flume::Sender<InboundFrame>,
) -> Result<TlsTransport, TransportError> {
    let config = build_client_config(options)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name =
        ServerName::try_from(url.host.clone()).map_err(|_| TransportError::Tls {
            addr: url.addr(),
            reason: format!("'{}' is not a valid TLS server name", url.host),
        })?;

    let tcp = establish_tcp(&url.addr(), options.connect_timeout).await?;
    let stream = timeout(options.connect_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| TransportError::Tls {
            addr: url.addr(),
            reason: format!(
                "handshake timed out after {:?}",
                options.connect_timeout
            ),
        })?
        .map_err(|e| TransportError::Tls {
            addr: url.addr(),
            reason: e.to_string(),
        })?;

    let (read_half, write_half) = tokio::io::split(stream);
    let stats = Arc::new(TransportStats::default());
    let read_task = spawn_read_loop(
        read_half,
        url.to_string(),
        options.read_timeout,
        inbound,
        Arc::clone(&stats),
    );

    debug!(link = %url, "tls link ready");
    Ok(StreamTransport::new(
        url,
        write_half,
        options.send_timeout,
        stats,
        read_task,
    ))
}

/// Builds the rustls client configuration from the link options.
pub fn build_client_config(options: &LinkOptions) -> Result<ClientConfig, TransportError> {
    let mut roots = RootCertStore::empty();
    match &options.ca_cert {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|e| {
                    TransportError::Certificate(format!(
                        "CA certificate in {} rejected: {e}",
                        path.display()
                    ))
                })?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match (&options.client_cert, &options.client_key) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TransportError::Certificate(e.to_string()))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(TransportError::Certificate(
                "client_cert and client_key must be set together".to_string(),
            ))
        }
    };
    Ok(config)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| {
        TransportError::Certificate(format!("cannot read {}: {e}", path.display()))
    })?);
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut reader).collect();
    let certs = certs.map_err(|e| {
        TransportError::Certificate(format!("bad PEM in {}: {e}", path.display()))
    })?;
    if certs.is_empty() {
        return Err(TransportError::Certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| {
        TransportError::Certificate(format!("cannot read {}: {e}", path.display()))
    })?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            TransportError::Certificate(format!("bad PEM in {}: {e}", path.display()))
        })?
        .ok_or_else(|| {
            TransportError::Certificate(format!("no private key found in {}", path.display()))
        })
}
