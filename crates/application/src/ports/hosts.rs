use async_trait::async_trait;
use bastion_dns_domain::RecordType;
use std::net::IpAddr;
use std::sync::Arc;

/// Result of a hosts-file lookup.
#[derive(Debug, Clone, Default)]
pub struct HostsMatch {
    /// Hostname, for address → name (PTR) lookups.
    pub host: Option<Arc<str>>,
    /// Addresses, for name → address lookups.
    pub addresses: Vec<IpAddr>,
}

impl HostsMatch {
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.addresses.is_empty()
    }
}

/// Immutable hosts-file snapshot behind a watcher.
///
/// Lookups may touch the snapshot holder, which can suspend briefly while
/// a reload swaps it, hence the async interface.
#[async_trait]
pub trait HostsContainer: Send + Sync {
    /// Match a question (name already lower-cased, no trailing dot)
    /// against the hosts file. PTR questions pass the `.arpa` name.
    async fn match_host(&self, name: &str, qtype: RecordType) -> Option<HostsMatch>;

    async fn resolve_ips(&self, name: &str) -> Vec<IpAddr>;
}
