use crate::errors::ForwardError;
use crate::filtering::BlockingMode;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Strategy for querying an upstream set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamMode {
    /// Weighted pick of a single server by recent latency.
    LoadBalance,
    /// Race every server, first useful answer wins.
    Parallel,
    /// Race every server, then prefer the answer whose address is
    /// reachable fastest.
    FastestAddr,
}

impl Default for UpstreamMode {
    fn default() -> Self {
        UpstreamMode::LoadBalance
    }
}

/// Domain-specific upstream override.
///
/// Queries whose name equals `domain` or falls under it are routed to
/// `upstreams` instead of the default set. The longest matching suffix
/// wins. Two markers from the config syntax:
/// - a domain of `/` matches every name (root catch-all);
/// - an upstream entry of `#` means "use the default set after all"
///   (carves an exception out of a broader override).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainUpstreams {
    pub domain: String,

    pub upstreams: Vec<String>,
}

impl DomainUpstreams {
    pub const DEFAULT_MARKER: &'static str = "#";
    pub const ROOT_DOMAIN: &'static str = "/";

    pub fn is_root(&self) -> bool {
        self.domain == Self::ROOT_DOMAIN
    }

    /// Exact or subdomain match against a name without its trailing dot.
    pub fn matches_domain(&self, query_domain: &str) -> bool {
        if self.is_root() {
            return true;
        }

        let query = query_domain.to_lowercase();
        let rule = self.domain.to_lowercase();

        query == rule || query.ends_with(&format!(".{rule}"))
    }

    /// Suffix length used to rank competing overrides.
    pub fn specificity(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.domain.len()
        }
    }

    pub fn uses_default(&self) -> bool {
        self.upstreams.iter().any(|u| u == Self::DEFAULT_MARKER)
    }
}

/// `host → ipset names` dispatch rule. An empty host is the root
/// catch-all.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpsetRule {
    pub domains: Vec<String>,

    pub set_names: Vec<String>,
}

/// Encrypted-endpoint advertisement for Discovery of Designated
/// Resolvers. Ports left unset mean the transport is not offered.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DdrConfig {
    #[serde(default)]
    pub https_port: Option<u16>,

    #[serde(default)]
    pub tls_port: Option<u16>,

    #[serde(default)]
    pub quic_port: Option<u16>,

    /// Whether the serving certificate carries IP SANs. DoT records are
    /// only advertised when it does.
    #[serde(default)]
    pub has_ip_addrs: bool,

    #[serde(default = "default_doh_path")]
    pub doh_path: String,
}

impl Default for DdrConfig {
    fn default() -> Self {
        Self {
            https_port: None,
            tls_port: None,
            quic_port: None,
            has_ip_addrs: false,
            doh_path: default_doh_path(),
        }
    }
}

fn default_doh_path() -> String {
    "/dns-query{?dns}".to_string()
}

/// Forwarding pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DnsConfig {
    #[serde(default = "default_upstreams")]
    pub upstream_servers: Vec<String>,

    #[serde(default)]
    pub upstream_mode: UpstreamMode,

    /// Per-upstream exchange timeout, milliseconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,

    /// Reachability-race deadline for `fastest_addr`, milliseconds.
    #[serde(default = "default_fastest_ping_timeout")]
    pub fastest_ping_timeout: u64,

    #[serde(default)]
    pub domain_upstreams: Vec<DomainUpstreams>,

    /// Dedicated resolvers for PTR questions in locally-served ranges.
    #[serde(default)]
    pub private_rdns_upstreams: Vec<String>,

    #[serde(default = "default_true")]
    pub use_private_rdns: bool,

    #[serde(default)]
    pub aaaa_disabled: bool,

    #[serde(default = "default_true")]
    pub handle_ddr: bool,

    #[serde(default)]
    pub ddr: DdrConfig,

    #[serde(default)]
    pub enable_dnssec: bool,

    #[serde(default)]
    pub use_dns64: bool,

    /// NAT64 prefixes; the first /96 is used. Empty means the well-known
    /// 64:ff9b::/96.
    #[serde(default)]
    pub dns64_prefixes: Vec<String>,

    #[serde(default)]
    pub refuse_any: bool,

    #[serde(default = "default_true")]
    pub protection_enabled: bool,

    #[serde(default)]
    pub blocking_mode: BlockingMode,

    #[serde(default)]
    pub blocking_ipv4: Option<Ipv4Addr>,

    #[serde(default)]
    pub blocking_ipv6: Option<Ipv6Addr>,

    #[serde(default = "default_blocked_response_ttl")]
    pub blocked_response_ttl: u32,

    /// Suffix under which DHCP hostnames are answered (e.g. `lan`).
    #[serde(default = "default_local_domain")]
    pub local_domain_suffix: String,

    /// FQDN advertised as the SVCB target in DDR answers.
    #[serde(default)]
    pub server_name: String,

    #[serde(default)]
    pub ipset_rules: Vec<IpsetRule>,

    /// Client addresses are masked to these prefix lengths before
    /// telemetry dispatch.
    #[serde(default = "default_subnet_len_4")]
    pub ratelimit_subnet_len_4: u8,

    #[serde(default = "default_subnet_len_6")]
    pub ratelimit_subnet_len_6: u8,
}

impl DnsConfig {
    pub fn validate(&self) -> Result<(), ForwardError> {
        if self.local_domain_suffix.is_empty()
            || self.local_domain_suffix.starts_with('.')
            || self.local_domain_suffix.ends_with('.')
        {
            return Err(ForwardError::Config(format!(
                "invalid local domain suffix: {:?}",
                self.local_domain_suffix
            )));
        }

        if self.ratelimit_subnet_len_4 > 32 {
            return Err(ForwardError::Config(format!(
                "IPv4 subnet length out of range: {}",
                self.ratelimit_subnet_len_4
            )));
        }
        if self.ratelimit_subnet_len_6 > 128 {
            return Err(ForwardError::Config(format!(
                "IPv6 subnet length out of range: {}",
                self.ratelimit_subnet_len_6
            )));
        }

        for prefix in &self.dns64_prefixes {
            let net: ipnetwork::Ipv6Network = prefix
                .parse()
                .map_err(|e| ForwardError::Config(format!("bad DNS64 prefix {prefix:?}: {e}")))?;
            if net.prefix() != 96 {
                return Err(ForwardError::Config(format!(
                    "DNS64 prefix {prefix:?} is /{}, want /96",
                    net.prefix()
                )));
            }
        }

        Ok(())
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstream_servers: default_upstreams(),
            upstream_mode: UpstreamMode::default(),
            upstream_timeout: default_upstream_timeout(),
            fastest_ping_timeout: default_fastest_ping_timeout(),
            domain_upstreams: vec![],
            private_rdns_upstreams: vec![],
            use_private_rdns: true,
            aaaa_disabled: false,
            handle_ddr: true,
            ddr: DdrConfig::default(),
            enable_dnssec: false,
            use_dns64: false,
            dns64_prefixes: vec![],
            refuse_any: false,
            protection_enabled: true,
            blocking_mode: BlockingMode::default(),
            blocking_ipv4: None,
            blocking_ipv6: None,
            blocked_response_ttl: default_blocked_response_ttl(),
            local_domain_suffix: default_local_domain(),
            server_name: String::new(),
            ipset_rules: vec![],
            ratelimit_subnet_len_4: default_subnet_len_4(),
            ratelimit_subnet_len_6: default_subnet_len_6(),
        }
    }
}

fn default_upstreams() -> Vec<String> {
    vec!["9.9.9.9:53".to_string(), "1.1.1.1:53".to_string()]
}

fn default_upstream_timeout() -> u64 {
    10_000
}

fn default_fastest_ping_timeout() -> u64 {
    1_000
}

fn default_blocked_response_ttl() -> u32 {
    10
}

fn default_local_domain() -> String {
    "lan".to_string()
}

fn default_subnet_len_4() -> u8 {
    24
}

fn default_subnet_len_6() -> u8 {
    56
}

fn default_true() -> bool {
    true
}
