//! Plain UDP upstream transport.
//!
//! The only transport shipped with the core; encrypted transports plug in
//! through the same `UpstreamResolver` port.

use async_trait::async_trait;
use bastion_dns_application::ports::UpstreamResolver;
use bastion_dns_domain::ForwardError;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

pub struct UdpUpstream {
    server_addr: SocketAddr,
    address: String,
}

impl UdpUpstream {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            address: server_addr.to_string(),
        }
    }

    /// Parse `host:port` or bare `host` (port 53 implied).
    pub fn from_addr(addr: &str) -> Result<Self, ForwardError> {
        let parsed: SocketAddr = if let Ok(full) = addr.parse() {
            full
        } else {
            let ip = addr
                .parse::<std::net::IpAddr>()
                .map_err(|e| ForwardError::Config(format!("bad upstream {addr:?}: {e}")))?;
            SocketAddr::new(ip, 53)
        };
        Ok(Self::new(parsed))
    }
}

#[async_trait]
impl UpstreamResolver for UdpUpstream {
    async fn exchange(&self, request: Bytes) -> Result<Bytes, ForwardError> {
        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            "0.0.0.0:0".parse().expect("static addr")
        } else {
            "[::]:0".parse().expect("static addr")
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ForwardError::Io(e.to_string()))?;

        socket
            .send_to(&request, self.server_addr)
            .await
            .map_err(|e| ForwardError::Upstream {
                server: self.address.clone(),
                reason: format!("send failed: {e}"),
            })?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (n, from) =
                socket
                    .recv_from(&mut buf)
                    .await
                    .map_err(|e| ForwardError::Upstream {
                        server: self.address.clone(),
                        reason: format!("recv failed: {e}"),
                    })?;

            if from.ip() != self.server_addr.ip() {
                warn!(expected = %self.server_addr, received_from = %from, "UDP response from unexpected source");
                continue;
            }

            debug!(server = %self.server_addr, bytes = n, "UDP response received");
            buf.truncate(n);
            return Ok(Bytes::from(buf));
        }
    }

    fn address(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addr_with_and_without_port() {
        assert_eq!(UdpUpstream::from_addr("9.9.9.9:5353").unwrap().address(), "9.9.9.9:5353");
        assert_eq!(UdpUpstream::from_addr("9.9.9.9").unwrap().address(), "9.9.9.9:53");
        assert!(UdpUpstream::from_addr("not-an-ip").is_err());
    }

    #[tokio::test]
    async fn exchanges_over_a_local_socket() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..n], from).await.unwrap();
        });

        let upstream = UdpUpstream::new(server_addr);
        let response = upstream.exchange(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(&response[..], b"ping");
    }
}
