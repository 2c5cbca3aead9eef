//! Local name service: DHCP hostnames and hosts-file lookups under the
//! local domain suffix.
//!
//! The lease tables are rebuilt whole on every lease-change notification
//! and swapped atomically; readers grab a snapshot pointer and never see
//! a half-built table.

use arc_swap::ArcSwap;
use bastion_dns_application::ports::{DhcpServer, HostsContainer, HostsMatch};
use bastion_dns_domain::RecordType;
use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// One published snapshot of the lease tables.
pub struct DhcpTables {
    /// Immutable after publication.
    host_to_ip: FxHashMap<Arc<str>, IpAddr>,
    ip_to_host: DashMap<IpAddr, Arc<str>, FxBuildHasher>,
}

impl DhcpTables {
    fn empty() -> Self {
        Self {
            host_to_ip: FxHashMap::default(),
            ip_to_host: DashMap::with_hasher(FxBuildHasher),
        }
    }
}

pub struct LocalNameService {
    dhcp: Option<Arc<dyn DhcpServer>>,
    hosts: Option<Arc<dyn HostsContainer>>,
    /// Lower-cased, no dots at either end (e.g. `lan`).
    local_suffix: Arc<str>,
    tables: ArcSwap<DhcpTables>,
}

impl LocalNameService {
    pub fn new(
        dhcp: Option<Arc<dyn DhcpServer>>,
        hosts: Option<Arc<dyn HostsContainer>>,
        local_suffix: &str,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            dhcp,
            hosts,
            local_suffix: Arc::from(local_suffix.to_ascii_lowercase().as_str()),
            tables: ArcSwap::from_pointee(DhcpTables::empty()),
        });

        service.rebuild_tables();

        if let Some(dhcp) = &service.dhcp {
            let weak = Arc::downgrade(&service);
            dhcp.on_lease_change(Arc::new(move || {
                if let Some(service) = weak.upgrade() {
                    service.rebuild_tables();
                }
            }));
        }

        service
    }

    /// Snapshot the collaborator's lease table and publish it.
    pub fn rebuild_tables(&self) {
        let Some(dhcp) = &self.dhcp else {
            return;
        };

        let tables = DhcpTables::empty();
        let mut host_to_ip = FxHashMap::default();
        for lease in dhcp.leases() {
            let host: Arc<str> = Arc::from(lease.hostname.to_ascii_lowercase().as_str());
            host_to_ip.insert(Arc::clone(&host), lease.ip);
            tables.ip_to_host.insert(lease.ip, host);
        }
        let tables = DhcpTables {
            host_to_ip,
            ip_to_host: tables.ip_to_host,
        };

        debug!(leases = tables.host_to_ip.len(), "DHCP tables rebuilt");
        self.tables.store(Arc::new(tables));
    }

    pub fn dhcp_enabled(&self) -> bool {
        self.dhcp.as_ref().map(|d| d.enabled()).unwrap_or(false)
    }

    /// Whether `name` (lower-cased, no trailing dot) lies under the local
    /// domain suffix.
    pub fn is_under_local_suffix(&self, name: &str) -> bool {
        name.strip_suffix(&*self.local_suffix)
            .and_then(|rest| rest.strip_suffix('.'))
            .map(|rest| !rest.is_empty())
            .unwrap_or(false)
    }

    /// Bare hostname for an A/AAAA question one label below the local
    /// suffix, when DHCP is enabled. Everything else yields `""`-like
    /// `None`.
    pub fn dhcp_host_from_question(&self, name: &str, qtype: RecordType) -> Option<Arc<str>> {
        if !self.dhcp_enabled() || !qtype.is_address() {
            return None;
        }
        let host = name
            .strip_suffix(&*self.local_suffix)
            .and_then(|rest| rest.strip_suffix('.'))?;
        if host.is_empty() || host.contains('.') {
            return None;
        }
        Some(Arc::from(host))
    }

    /// Lease address for a bare hostname.
    pub fn ip_by_host(&self, host: &str) -> Option<IpAddr> {
        self.tables.load().host_to_ip.get(host).copied()
    }

    /// Lease hostname for an address, as a fully qualified local name
    /// (`host.<suffix>`).
    pub fn host_by_ip(&self, ip: IpAddr) -> Option<Arc<str>> {
        let tables = self.tables.load();
        let host = tables.ip_to_host.get(&ip)?;
        Some(Arc::from(format!("{}.{}", host.value(), self.local_suffix).as_str()))
    }

    pub async fn hosts_match(&self, name: &str, qtype: RecordType) -> Option<HostsMatch> {
        self.hosts.as_ref()?.match_host(name, qtype).await
    }

    pub async fn hosts_resolve(&self, name: &str) -> Vec<IpAddr> {
        match &self.hosts {
            Some(hosts) => hosts.resolve_ips(name).await,
            None => Vec::new(),
        }
    }
}
