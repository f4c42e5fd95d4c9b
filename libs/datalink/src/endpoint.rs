//! Remote endpoint addressing
//!
//! Endpoints are validated when parsed; name resolution is deferred to the
//! worker thread so callers never block on DNS.

use crate::error::{EndpointParseError, Result, TransportError};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// Port used when no endpoint is given
pub const DEFAULT_PORT: u16 = datalink_config::defaults::link::DEFAULT_PORT;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Host part of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ip(IpAddr),
    Name(String),
}

/// Network address + port identifying the remote peer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: Host,
    port: u16,
}

impl Endpoint {
    pub fn new(host: Host, port: u16) -> Self {
        Self { host, port }
    }

    /// IPv4 loopback on `port`
    pub fn loopback(port: u16) -> Self {
        Self::new(Host::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)), port)
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to candidate socket addresses (blocking for host names)
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        match &self.host {
            Host::Ip(ip) => Ok(vec![SocketAddr::new(*ip, self.port)]),
            Host::Name(name) => {
                let addrs: Vec<SocketAddr> = (name.as_str(), self.port)
                    .to_socket_addrs()
                    .map_err(|e| {
                        TransportError::network_with_source(format!("Failed to resolve {}", self), e)
                    })?
                    .collect();

                if addrs.is_empty() {
                    return Err(TransportError::network(format!(
                        "No addresses found for {}",
                        self
                    )));
                }
                Ok(addrs)
            }
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::loopback(DEFAULT_PORT)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(Host::Ip(addr.ip()), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            Host::Ip(IpAddr::V4(ip)) => write!(f, "{}:{}", ip, self.port),
            Host::Name(name) => write!(f, "{}:{}", name, self.port),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointParseError::Empty);
        }

        // Bracketed IPv6: [::1]:5000
        if let Some(rest) = s.strip_prefix('[') {
            let (addr, port) = rest
                .split_once("]:")
                .ok_or_else(|| EndpointParseError::MissingPort(s.to_string()))?;
            let ip = addr
                .parse::<std::net::Ipv6Addr>()
                .map_err(|_| EndpointParseError::InvalidHost(addr.to_string()))?;
            return Ok(Self::new(Host::Ip(IpAddr::V6(ip)), parse_port(port)?));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(s.to_string()))?;

        if host.contains(':') {
            // Unbracketed IPv6 is ambiguous with the port separator
            return Err(EndpointParseError::InvalidHost(host.to_string()));
        }

        let port = parse_port(port)?;
        let host = parse_host(host)?;
        Ok(Self::new(host, port))
    }
}

fn parse_port(port: &str) -> std::result::Result<u16, EndpointParseError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(EndpointParseError::InvalidPort(port.to_string())),
        Ok(port) => Ok(port),
    }
}

fn parse_host(host: &str) -> std::result::Result<Host, EndpointParseError> {
    if host.is_empty() {
        return Err(EndpointParseError::InvalidHost(host.to_string()));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Host::Ip(ip));
    }

    let invalid = || EndpointParseError::InvalidHost(host.to_string());
    let name = host.strip_suffix('.').unwrap_or(host);
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return Err(invalid());
    }

    let labels: Vec<&str> = name.split('.').collect();
    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid {
            return Err(invalid());
        }
    }

    // All-numeric names are malformed IPv4 literals such as 300.1.1.1
    if labels.iter().all(|l| l.bytes().all(|b| b.is_ascii_digit())) {
        return Err(invalid());
    }

    Ok(Host::Name(name.to_ascii_lowercase()))
}
