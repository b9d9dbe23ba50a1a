//! Link addressing.
//!
//! Destinations are written as `scheme://host:port` with `udp`, `tcp` or
//! `tls` schemes (`ssl` is accepted as an alias for `tls`). The scheme
//! picks the transport; whether the host is a multicast group, a unicast
//! IP or a hostname later drives the default wire format for the link.

use crate::error::VigilError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScheme {
    Udp,
    Tcp,
    Tls,
}

impl LinkScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkScheme::Udp => "udp",
            LinkScheme::Tcp => "tcp",
            LinkScheme::Tls => "tls",
        }
    }
}

impl fmt::Display for LinkScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed destination URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkUrl {
    pub scheme: LinkScheme,
    pub host: String,
    pub port: u16,
}

impl LinkUrl {
    pub fn parse(raw: &str) -> Result<Self, VigilError> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| VigilError::invalid_url(raw, "missing scheme"))?;
        let scheme = match scheme {
            "udp" => LinkScheme::Udp,
            "tcp" => LinkScheme::Tcp,
            "tls" | "ssl" => LinkScheme::Tls,
            other => {
                return Err(VigilError::invalid_url(
                    raw,
                    format!("unsupported scheme '{other}'"),
                ))
            }
        };
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| VigilError::invalid_url(raw, "missing port"))?;
        if host.is_empty() {
            return Err(VigilError::invalid_url(raw, "empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| VigilError::invalid_url(raw, format!("invalid port '{port}'")))?;
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, suitable for socket address resolution.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The host as an IP address, if it is one. Bracketed IPv6 literals
    /// are unwrapped first.
    pub fn host_ip(&self) -> Option<IpAddr> {
        let host = self
            .host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host);
        host.parse().ok()
    }

    pub fn is_multicast(&self) -> bool {
        matches!(self.host_ip(), Some(ip) if ip.is_multicast())
    }
}

impl fmt::Display for LinkUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_udp_multicast_url() {
        let url = LinkUrl::parse("udp://239.2.3.1:6969").unwrap();
        assert_eq!(url.scheme, LinkScheme::Udp);
        assert_eq!(url.host, "239.2.3.1");
        assert_eq!(url.port, 6969);
        assert!(url.is_multicast());
    }

    #[test]
    fn unicast_ip_is_not_multicast() {
        let url = LinkUrl::parse("tcp://192.168.1.10:8087").unwrap();
        assert!(!url.is_multicast());
        assert!(url.host_ip().is_some());
    }

    #[test]
    fn hostname_has_no_ip() {
        let url = LinkUrl::parse("tls://takserver.example.com:8089").unwrap();
        assert_eq!(url.scheme, LinkScheme::Tls);
        assert!(url.host_ip().is_none());
        assert!(!url.is_multicast());
    }

    #[test]
    fn ssl_is_an_alias_for_tls() {
        let url = LinkUrl::parse("ssl://10.0.0.5:8089").unwrap();
        assert_eq!(url.scheme, LinkScheme::Tls);
    }

    #[test]
    fn bracketed_ipv6_host_parses() {
        let url = LinkUrl::parse("tcp://[ff02::1]:4242").unwrap();
        assert!(url.host_ip().is_some());
        assert!(url.is_multicast());
    }

    #[test]
    fn rejects_missing_scheme_and_port() {
        assert!(LinkUrl::parse("239.2.3.1:6969").is_err());
        assert!(LinkUrl::parse("udp://239.2.3.1").is_err());
        assert!(LinkUrl::parse("udp://:6969").is_err());
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = LinkUrl::parse("ws://host:80").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn display_round_trips() {
        let url = LinkUrl::parse("udp://239.2.3.1:6969").unwrap();
        assert_eq!(url.to_string(), "udp://239.2.3.1:6969");
    }
}
