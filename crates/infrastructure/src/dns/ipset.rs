//! Ipset dispatch: pushing resolved addresses into kernel netfilter sets.
//!
//! The pipeline always calls the dispatcher; on non-Linux targets the
//! wired manager is a constant success, so the stage degrades to a no-op.
//! Failures never fail the request.

use async_trait::async_trait;
use bastion_dns_application::ports::IpsetManager;
use bastion_dns_domain::config::IpsetRule;
use bastion_dns_domain::{ForwardError, RecordType};
use hickory_proto::rr::RData;
use rustc_hash::FxHashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::context::DnsContext;

struct CompiledRule {
    /// Lower-cased suffix; empty string is the root catch-all.
    domain: String,
    set_names: Vec<Arc<str>>,
}

impl CompiledRule {
    fn matches(&self, host: &str) -> bool {
        if self.domain.is_empty() {
            return true;
        }
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }
}

pub struct IpsetDispatcher {
    rules: Vec<CompiledRule>,
    manager: Arc<dyn IpsetManager>,
    /// Lifetime-wide dedup of addresses already pushed; doubles as the
    /// serialization point for kernel writes.
    seen: Mutex<FxHashSet<IpAddr>>,
}

impl IpsetDispatcher {
    pub fn new(rules: &[IpsetRule], manager: Arc<dyn IpsetManager>) -> Self {
        let mut compiled = Vec::new();
        for rule in rules {
            let set_names: Vec<Arc<str>> = rule
                .set_names
                .iter()
                .map(|s| Arc::from(s.as_str()))
                .collect();
            for domain in &rule.domains {
                let mut domain = domain.trim().to_ascii_lowercase();
                if domain.ends_with('.') {
                    domain.pop();
                }
                compiled.push(CompiledRule {
                    domain,
                    set_names: set_names.clone(),
                });
            }
        }
        Self {
            rules: compiled,
            manager,
            seen: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn disabled(manager: Arc<dyn IpsetManager>) -> Self {
        Self {
            rules: Vec::new(),
            manager,
            seen: Mutex::new(FxHashSet::default()),
        }
    }

    fn longest_match(&self, host: &str) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .filter(|r| r.matches(host))
            .max_by_key(|r| r.domain.len())
    }

    /// Push the answer's addresses into the matching sets. Best effort.
    pub async fn dispatch(&self, ctx: &DnsContext) {
        if self.rules.is_empty() || !ctx.response_from_upstream {
            return;
        }
        let Some((host, qtype)) = ctx.question() else {
            return;
        };
        if !matches!(qtype, RecordType::A | RecordType::AAAA | RecordType::ANY) {
            return;
        }
        let Some(rule) = self.longest_match(&host) else {
            return;
        };
        let Some(response) = &ctx.response else {
            return;
        };

        // v4 and v6 travel separately; `family inet` and `family inet6`
        // sets cannot share a call.
        let mut ip4s: Vec<Ipv4Addr> = Vec::new();
        let mut ip6s: Vec<Ipv6Addr> = Vec::new();
        for record in response.answers() {
            match record.data() {
                RData::A(a) => ip4s.push(a.0),
                RData::AAAA(aaaa) => ip6s.push(aaaa.0),
                _ => {}
            }
        }

        let mut seen = self.seen.lock().await;
        ip4s.retain(|v4| !seen.contains(&IpAddr::V4(*v4)));
        ip6s.retain(|v6| !seen.contains(&IpAddr::V6(*v6)));
        if ip4s.is_empty() && ip6s.is_empty() {
            return;
        }

        match self
            .manager
            .add(ctx.deadline, &host, &rule.set_names, &ip4s, &ip6s)
            .await
        {
            Ok(n) => {
                for v4 in &ip4s {
                    seen.insert(IpAddr::V4(*v4));
                }
                for v6 in &ip6s {
                    seen.insert(IpAddr::V6(*v6));
                }
                debug!(%host, added = n, "addresses dispatched to ipsets");
            }
            Err(e) => {
                warn!(%host, error = %e, "ipset dispatch failed");
            }
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.manager.close().await {
            warn!(error = %e, "ipset manager close failed");
        }
    }
}

/// Constant-success manager wired on platforms without netfilter, or
/// when no real manager is supplied.
pub struct NoopIpsetManager;

#[async_trait]
impl IpsetManager for NoopIpsetManager {
    async fn add(
        &self,
        _deadline: Option<Instant>,
        _host: &str,
        _set_names: &[Arc<str>],
        _ip4s: &[Ipv4Addr],
        _ip6s: &[Ipv6Addr],
    ) -> Result<usize, ForwardError> {
        Ok(0)
    }

    async fn close(&self) -> Result<(), ForwardError> {
        Ok(())
    }
}

/// Platform gate: a supplied manager is only honored on Linux.
pub fn platform_manager(manager: Option<Arc<dyn IpsetManager>>) -> Arc<dyn IpsetManager> {
    #[cfg(target_os = "linux")]
    {
        manager.unwrap_or_else(|| Arc::new(NoopIpsetManager))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = manager;
        Arc::new(NoopIpsetManager)
    }
}
