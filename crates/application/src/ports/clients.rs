use super::upstream::UpstreamResolver;
use bastion_dns_domain::{FilteringSettings, ForwardError};
use std::net::IpAddr;
use std::sync::Arc;

/// Custom upstream set configured for one client.
#[derive(Clone)]
pub struct ClientUpstreams {
    pub upstreams: Vec<Arc<dyn UpstreamResolver>>,
}

/// Per-client configuration store.
///
/// Lookup precedence is the caller's: client identifier first, then the
/// client address rendered as a string.
pub trait ClientsContainer: Send + Sync {
    /// `Err` means the client's stored upstream spec failed to build;
    /// `Ok(None)` means the client has no custom upstreams.
    fn upstreams_for(
        &self,
        client_id: Option<&str>,
        addr: IpAddr,
    ) -> Result<Option<ClientUpstreams>, ForwardError>;

    /// Per-client filtering policy, when one is configured.
    fn filtering_settings_for(
        &self,
        client_id: Option<&str>,
        addr: IpAddr,
    ) -> Option<FilteringSettings>;
}
