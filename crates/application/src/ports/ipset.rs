use async_trait::async_trait;
use bastion_dns_domain::ForwardError;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Instant;

/// Kernel netfilter-set writer (Linux only; the non-Linux build wires a
/// constant-success stand-in instead).
///
/// Address families stay separate end to end: `family inet` sets take
/// `ip4s`, `family inet6` sets take `ip6s`.
#[async_trait]
pub trait IpsetManager: Send + Sync {
    /// Add the answer addresses resolved for `host` to each named set,
    /// returning how many additions were performed. `deadline` is the
    /// calling request's ambient deadline; kernel writes should not
    /// outlive it.
    async fn add(
        &self,
        deadline: Option<Instant>,
        host: &str,
        set_names: &[Arc<str>],
        ip4s: &[Ipv4Addr],
        ip6s: &[Ipv6Addr],
    ) -> Result<usize, ForwardError>;

    async fn close(&self) -> Result<(), ForwardError>;
}
