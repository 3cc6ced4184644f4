use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{Error, Result};

/// Connection settings as written by a user, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClamdConnection {
    Unix { path: String },
    Tcp { host: String, port: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet4,
    Inet6,
    Unix,
}

/// Resolved daemon address, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl Endpoint {
    /// Resolves `host` and keeps the first address the resolver returns.
    pub async fn resolve(host: &str, port: u16) -> Result<Self> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|e| Error::Resolution(format!("Failed to resolve {}:{}: {}", host, port, e)))?;

        let addr = addrs
            .next()
            .ok_or_else(|| Error::Resolution(format!("No address found for {}:{}", host, port)))?;

        debug!("Resolved {}:{} to {}", host, port, addr);
        Ok(Endpoint::Tcp(addr))
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Endpoint::Unix(path.into())
    }

    pub async fn from_connection(connection: &ClamdConnection) -> Result<Self> {
        match connection {
            ClamdConnection::Unix { path } => Ok(Endpoint::unix(path)),
            ClamdConnection::Tcp { host, port } => Endpoint::resolve(host, *port).await,
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Endpoint::Tcp(SocketAddr::V4(_)) => AddressFamily::Inet4,
            Endpoint::Tcp(SocketAddr::V6(_)) => AddressFamily::Inet6,
            Endpoint::Unix(_) => AddressFamily::Unix,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let endpoint = Endpoint::resolve("127.0.0.1", 3310).await.unwrap();
        assert_eq!(endpoint.family(), AddressFamily::Inet4);
        assert_eq!(endpoint.to_string(), "127.0.0.1:3310");
    }

    #[tokio::test]
    async fn test_resolve_ipv6_literal() {
        let endpoint = Endpoint::resolve("::1", 3310).await.unwrap();
        assert_eq!(endpoint.family(), AddressFamily::Inet6);
    }

    #[tokio::test]
    async fn test_resolve_unknown_host() {
        let result = Endpoint::resolve("no-such-host.invalid", 3310).await;
        match result.unwrap_err() {
            Error::Resolution(msg) => assert!(msg.contains("no-such-host.invalid")),
            other => panic!("Expected resolution error, got {:?}", other),
        }
    }

    #[test]
    fn test_unix_endpoint() {
        let endpoint = Endpoint::unix("/var/run/clamav/clamd.ctl");
        assert_eq!(endpoint.family(), AddressFamily::Unix);
        assert_eq!(endpoint.to_string(), "/var/run/clamav/clamd.ctl");
    }

    #[tokio::test]
    async fn test_from_connection() {
        let unix = ClamdConnection::Unix {
            path: "/tmp/clamd.ctl".to_string(),
        };
        assert_eq!(
            Endpoint::from_connection(&unix).await.unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/clamd.ctl"))
        );

        let tcp = ClamdConnection::Tcp {
            host: "127.0.0.1".to_string(),
            port: 3310,
        };
        let endpoint = Endpoint::from_connection(&tcp).await.unwrap();
        assert_eq!(endpoint, Endpoint::Tcp("127.0.0.1:3310".parse().unwrap()));
    }
}
