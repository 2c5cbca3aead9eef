use std::net::IpAddr;
use std::sync::Arc;

/// One active lease as exposed by the DHCP collaborator.
#[derive(Debug, Clone)]
pub struct DhcpLease {
    pub hostname: Arc<str>,
    pub ip: IpAddr,
}

/// Invoked by the DHCP server whenever its lease table changes.
pub type LeaseChangeHook = Arc<dyn Fn() + Send + Sync>;

/// DHCP server collaborator.
///
/// Lookups are table reads, so the interface is synchronous; the local
/// name service snapshots `leases()` on every change notification and
/// never holds a reference into the server's own state.
pub trait DhcpServer: Send + Sync {
    fn enabled(&self) -> bool;

    fn ip_by_host(&self, host: &str) -> Option<IpAddr>;

    fn host_by_ip(&self, ip: IpAddr) -> Option<Arc<str>>;

    fn leases(&self) -> Vec<DhcpLease>;

    /// Register a lease-change callback. Implementations must tolerate
    /// the hook being called from any thread.
    fn on_lease_change(&self, hook: LeaseChangeHook);
}
