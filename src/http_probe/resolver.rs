use std::io;
use std::net::SocketAddr;

use trust_dns_resolver::TokioAsyncResolver;

use crate::probe::error::ProbeError;

/// Name resolution used by the HTTP probers.
#[derive(Clone)]
pub enum Resolver {
    /// The operating system resolver (`getaddrinfo`).
    System,
    /// A resolver bound to explicitly configured name servers.
    Custom(TokioAsyncResolver),
}

impl Resolver {
    /// Resolves `host` into the socket addresses to dial, in preference order.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
        let addrs: Vec<SocketAddr> = match self {
            Resolver::System => tokio::net::lookup_host((host, port))
                .await
                .map_err(|e| ProbeError::dns(host, e))?
                .collect(),
            Resolver::Custom(resolver) => resolver
                .lookup_ip(host)
                .await
                .map_err(|e| ProbeError::dns(host, e))?
                .iter()
                .map(|ip| SocketAddr::new(ip, port))
                .collect(),
        };

        if addrs.is_empty() {
            return Err(ProbeError::dns(
                host,
                io::Error::new(io::ErrorKind::NotFound, format!("lookup {host}: no such host")),
            ));
        }
        Ok(addrs)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolver::System => f.write_str("Resolver::System"),
            Resolver::Custom(_) => f.write_str("Resolver::Custom"),
        }
    }
}
