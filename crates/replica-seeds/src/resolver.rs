//! Resolver transport
//!
//! [`DnsExchange`] is the seam between the poller and the network: one query
//! datagram out, one reply datagram back. [`UdpExchange`] is the production
//! implementation; tests substitute scripted exchanges.

use crate::dns::MAX_RESPONSE_LEN;
use crate::error::SeedError;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Standard DNS port
pub const DNS_PORT: u16 = 53;
/// System resolver configuration
pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// One query/reply round trip with a resolver
#[async_trait]
pub trait DnsExchange: Send + Sync {
    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>, SeedError>;
}

/// UDP exchange against a single resolver
#[derive(Debug, Clone)]
pub struct UdpExchange {
    resolver: SocketAddr,
    timeout: Duration,
}

impl UdpExchange {
    pub fn new(resolver: SocketAddr, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Use the first nameserver listed in `/etc/resolv.conf`
    pub fn system(timeout: Duration) -> Result<Self, SeedError> {
        Ok(Self::new(system_resolver()?, timeout))
    }

    pub fn resolver(&self) -> SocketAddr {
        self.resolver
    }

    async fn bind(&self) -> Result<UdpSocket, SeedError> {
        let bind_addr: SocketAddr = match self.resolver.ip() {
            IpAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
            IpAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| SeedError::Query(format!("Failed to bind DNS socket: {}", e)))?;
        socket.connect(self.resolver).await.map_err(|e| {
            SeedError::Query(format!("Failed to connect to {}: {}", self.resolver, e))
        })?;
        Ok(socket)
    }
}

#[async_trait]
impl DnsExchange for UdpExchange {
    async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>, SeedError> {
        let socket = self.bind().await?;
        socket
            .send(query)
            .await
            .map_err(|e| SeedError::Query(format!("Failed to send DNS query: {}", e)))?;

        // One spare byte tells an oversized datagram apart from a full one
        let mut buffer = vec![0u8; MAX_RESPONSE_LEN + 1];
        let len = timeout(self.timeout, socket.recv(&mut buffer))
            .await
            .map_err(|_| SeedError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| SeedError::Query(format!("Failed to receive DNS reply: {}", e)))?;

        if len > MAX_RESPONSE_LEN {
            return Err(SeedError::ResponseTooLarge {
                len,
                limit: MAX_RESPONSE_LEN,
            });
        }
        buffer.truncate(len);
        tracing::trace!(resolver = %self.resolver, len, "DNS reply received");
        Ok(buffer)
    }
}

/// First nameserver in `/etc/resolv.conf`
pub fn system_resolver() -> Result<SocketAddr, SeedError> {
    resolver_from_file(Path::new(RESOLV_CONF))
}

pub fn resolver_from_file(path: &Path) -> Result<SocketAddr, SeedError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SeedError::NoResolver(format!("{}: {}", path.display(), e)))?;
    parse_resolv_conf(&contents).ok_or_else(|| {
        SeedError::NoResolver(format!("no usable nameserver in {}", path.display()))
    })
}

/// Extract the first parsable `nameserver` entry
pub fn parse_resolv_conf(contents: &str) -> Option<SocketAddr> {
    contents.lines().find_map(|line| {
        let line = line.split(['#', ';']).next()?.trim();
        let mut fields = line.split_whitespace();
        if fields.next()? != "nameserver" {
            return None;
        }
        // Strip an IPv6 zone id
        let addr = fields.next()?.split('%').next()?;
        addr.parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, DNS_PORT))
    })
}
