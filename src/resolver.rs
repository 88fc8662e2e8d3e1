//! Hostname resolution for the configured console address
//!
//! IP literals are returned as-is without touching DNS. Anything else goes
//! through a [`DnsLookup`] implementation; the system resolver is the default.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use crate::error::ResolveError;

/// Name lookup backend
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Look up all addresses for a hostname
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Lookup through the operating system resolver (tokio's `lookup_host`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDns;

#[async_trait]
impl DnsLookup for SystemDns {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[async_trait]
impl<T: DnsLookup + ?Sized> DnsLookup for Arc<T> {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        (**self).lookup(host).await
    }
}

/// Parse an IPv4/IPv6 literal. Bracketed IPv6 (`[::1]`) is accepted.
pub fn ip_literal(host: &str) -> Option<IpAddr> {
    let trimmed = host.trim();
    let bare = trimmed
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(trimmed);
    bare.parse().ok()
}

/// Resolves configured hosts to concrete IP addresses
pub struct HostResolver<D = SystemDns> {
    dns: D,
}

impl HostResolver<SystemDns> {
    /// Resolver backed by the system DNS
    pub fn system() -> Self {
        Self { dns: SystemDns }
    }
}

impl Default for HostResolver<SystemDns> {
    fn default() -> Self {
        Self::system()
    }
}

impl<D: DnsLookup> HostResolver<D> {
    /// Resolver with a custom lookup backend
    pub fn with_lookup(dns: D) -> Self {
        Self { dns }
    }

    /// Resolve a hostname or IP literal
    ///
    /// IPv4 results are preferred over IPv6 when a name has both.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ResolveError::Empty);
        }

        if let Some(ip) = ip_literal(host) {
            return Ok(ip);
        }

        debug!("Resolving hostname '{}'", host);
        let addrs = self
            .dns
            .lookup(host)
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;

        let chosen = addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ResolveError::NoAddress {
                host: host.to_string(),
            })?;

        debug!("Resolved '{}' -> {}", host, chosen);
        Ok(chosen)
    }
}
