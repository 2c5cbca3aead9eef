//! Per-client access control.
//!
//! Built once from the raw config lists and swapped whole on reload;
//! all query-path reads are lock-free.

pub mod host_rules;

use bastion_dns_domain::{validators, ForwardError, RecordType};
use host_rules::HostRuleSet;
use ipnetwork::IpNetwork;
use rustc_hash::{FxHashMap, FxHashSet};
use std::net::IpAddr;
use std::sync::Arc;

/// One parsed client entry. Parsing prefers IP over CIDR over client-id.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClientEntry {
    Ip(IpAddr),
    Net(IpNetwork),
    Id(Arc<str>),
}

fn parse_client_entry(raw: &str) -> Result<ClientEntry, ForwardError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ForwardError::Config("empty client entry".into()));
    }

    // IPv6 zone identifiers are dropped before matching.
    let zoneless = strip_zone(trimmed);

    if let Ok(ip) = zoneless.parse::<IpAddr>() {
        return Ok(ClientEntry::Ip(ip));
    }
    if let Ok(net) = zoneless.parse::<IpNetwork>() {
        return Ok(ClientEntry::Net(net));
    }

    validators::validate_client_id(trimmed).map_err(ForwardError::Config)?;
    Ok(ClientEntry::Id(Arc::from(trimmed)))
}

fn strip_zone(s: &str) -> &str {
    match s.split_once('%') {
        Some((addr, _zone)) => addr,
        None => s,
    }
}

pub struct AccessManager {
    allowed_ips: FxHashSet<IpAddr>,
    blocked_ips: FxHashMap<IpAddr, Arc<str>>,
    /// Insertion order is match order.
    allowed_nets: Vec<IpNetwork>,
    blocked_nets: Vec<(IpNetwork, Arc<str>)>,
    allowed_ids: FxHashSet<Arc<str>>,
    blocked_ids: FxHashSet<Arc<str>>,
    blocked_hosts: HostRuleSet,
}

impl AccessManager {
    pub fn new(
        allowed_clients: &[String],
        blocked_clients: &[String],
        blocked_hosts: &[String],
    ) -> Result<Self, ForwardError> {
        // Reject a batch whose two sides intersect on an exact entry.
        let allowed_set: FxHashSet<&str> =
            allowed_clients.iter().map(|s| s.trim()).collect();
        for entry in blocked_clients {
            if allowed_set.contains(entry.trim()) {
                return Err(ForwardError::Config(format!(
                    "client entry {entry:?} is both allowed and blocked"
                )));
            }
        }

        let mut manager = Self {
            allowed_ips: FxHashSet::default(),
            blocked_ips: FxHashMap::default(),
            allowed_nets: Vec::new(),
            blocked_nets: Vec::new(),
            allowed_ids: FxHashSet::default(),
            blocked_ids: FxHashSet::default(),
            blocked_hosts: HostRuleSet::compile(blocked_hosts)?,
        };

        for raw in allowed_clients {
            match parse_client_entry(raw)? {
                ClientEntry::Ip(ip) => {
                    manager.allowed_ips.insert(ip);
                }
                ClientEntry::Net(net) => manager.allowed_nets.push(net),
                ClientEntry::Id(id) => {
                    manager.allowed_ids.insert(id);
                }
            }
        }
        for raw in blocked_clients {
            let rule: Arc<str> = Arc::from(raw.trim());
            match parse_client_entry(raw)? {
                ClientEntry::Ip(ip) => {
                    manager.blocked_ips.insert(ip, rule);
                }
                ClientEntry::Net(net) => manager.blocked_nets.push((net, rule)),
                ClientEntry::Id(id) => {
                    manager.blocked_ids.insert(id);
                }
            }
        }

        Ok(manager)
    }

    pub fn from_config(config: &bastion_dns_domain::AccessConfig) -> Result<Self, ForwardError> {
        Self::new(
            &config.allowed_clients,
            &config.blocked_clients,
            &config.blocked_hosts,
        )
    }

    /// Any non-empty allow set flips the default decision to deny.
    pub fn allowlist_mode(&self) -> bool {
        !self.allowed_ips.is_empty()
            || !self.allowed_nets.is_empty()
            || !self.allowed_ids.is_empty()
    }

    pub fn is_blocked_client_id(&self, id: &str) -> bool {
        if self.allowlist_mode() {
            if id.is_empty() {
                return true;
            }
            return !self.allowed_ids.contains(id);
        }
        !id.is_empty() && self.blocked_ids.contains(id)
    }

    /// Longest-match decision for an address: an exact set hit wins over
    /// a CIDR hit; CIDRs are scanned in insertion order. Never returns a
    /// rule for an unblocked address.
    pub fn is_blocked_ip(&self, ip: IpAddr) -> (bool, Option<Arc<str>>) {
        if self.allowlist_mode() {
            if self.allowed_ips.contains(&ip) {
                return (false, None);
            }
            if self.allowed_nets.iter().any(|net| net.contains(ip)) {
                return (false, None);
            }
            return (true, None);
        }

        if let Some(rule) = self.blocked_ips.get(&ip) {
            return (true, Some(Arc::clone(rule)));
        }
        for (net, rule) in &self.blocked_nets {
            if net.contains(ip) {
                return (true, Some(Arc::clone(rule)));
            }
        }
        (false, None)
    }

    /// Matched rule text when (name, qtype) hits the blocked-host set.
    /// `name` must be lower-cased, without a trailing dot.
    pub fn is_blocked_host(&self, name: &str, qtype: RecordType) -> Option<Arc<str>> {
        self.blocked_hosts.match_host(name, qtype)
    }
}
