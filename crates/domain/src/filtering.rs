use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// Outcome classification of a filtering pass over one request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterReason {
    NotFiltered,
    NotFilteredAllowList,
    FilteredBlockList,
    FilteredSafeBrowsing,
    FilteredSafeSearch,
    FilteredParental,
    FilteredInvalid,
    FilteredBlockedService,
    Rewritten,
    RewrittenRule,
}

impl FilterReason {
    /// True when the request must be answered with a blocked response
    /// instead of being forwarded.
    pub fn is_filtered(&self) -> bool {
        matches!(
            self,
            FilterReason::FilteredBlockList
                | FilterReason::FilteredSafeBrowsing
                | FilterReason::FilteredSafeSearch
                | FilterReason::FilteredParental
                | FilterReason::FilteredInvalid
                | FilterReason::FilteredBlockedService
        )
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(self, FilterReason::Rewritten | FilterReason::RewrittenRule)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::NotFiltered => "not_filtered",
            FilterReason::NotFilteredAllowList => "not_filtered_allowlist",
            FilterReason::FilteredBlockList => "filtered_blocklist",
            FilterReason::FilteredSafeBrowsing => "filtered_safe_browsing",
            FilterReason::FilteredSafeSearch => "filtered_safe_search",
            FilterReason::FilteredParental => "filtered_parental",
            FilterReason::FilteredInvalid => "filtered_invalid",
            FilterReason::FilteredBlockedService => "filtered_blocked_service",
            FilterReason::Rewritten => "rewritten",
            FilterReason::RewrittenRule => "rewritten_rule",
        }
    }
}

/// Result of one filtering pass: the reason plus whatever auxiliary data
/// the decision produced (matched rule text, rewrite target, synthesized
/// addresses).
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub reason: FilterReason,
    /// Text of the rule that matched, when one did.
    pub rule: Option<Arc<str>>,
    /// Canonical name a rewrite points the question at.
    pub canonical_name: Option<Arc<str>>,
    /// A/AAAA addresses a rewrite synthesizes directly.
    pub addresses: Vec<IpAddr>,
    /// Name of the blocked service, for `FilteredBlockedService`.
    pub service_name: Option<Arc<str>>,
}

impl FilterResult {
    pub fn not_filtered() -> Self {
        Self {
            reason: FilterReason::NotFiltered,
            rule: None,
            canonical_name: None,
            addresses: Vec::new(),
            service_name: None,
        }
    }

    pub fn blocked(reason: FilterReason, rule: impl Into<Arc<str>>) -> Self {
        Self {
            reason,
            rule: Some(rule.into()),
            canonical_name: None,
            addresses: Vec::new(),
            service_name: None,
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.reason.is_filtered()
    }

    pub fn is_rewrite(&self) -> bool {
        self.reason.is_rewrite()
    }

    /// A rewrite that supplies only a CNAME and no addresses: the pipeline
    /// forwards the aliased name upstream.
    pub fn is_cname_only_rewrite(&self) -> bool {
        self.is_rewrite() && self.canonical_name.is_some() && self.addresses.is_empty()
    }
}

/// Per-client filtering policy snapshot, taken once per request.
#[derive(Debug, Clone)]
pub struct FilteringSettings {
    pub filtering_enabled: bool,
    pub safe_browsing_enabled: bool,
    pub safe_search_enabled: bool,
    pub parental_enabled: bool,
    pub blocked_services: Vec<Arc<str>>,
}

impl FilteringSettings {
    /// Drop everything but the plain blocklists. Used for PTR questions in
    /// locally-served ranges, where parental/safe-* categories make no sense.
    pub fn with_local_ptr_overrides(mut self) -> Self {
        self.safe_browsing_enabled = false;
        self.safe_search_enabled = false;
        self.parental_enabled = false;
        self.blocked_services.clear();
        self
    }
}

impl Default for FilteringSettings {
    fn default() -> Self {
        Self {
            filtering_enabled: true,
            safe_browsing_enabled: false,
            safe_search_enabled: false,
            parental_enabled: false,
            blocked_services: Vec::new(),
        }
    }
}

/// How blocked questions are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    /// NXDOMAIN (also the fallback when a custom IP is missing).
    Default,
    Refused,
    Nxdomain,
    /// 0.0.0.0 / :: answers.
    NullIp,
    /// Answers from `blocking_ipv4` / `blocking_ipv6`.
    CustomIp,
}

impl Default for BlockingMode {
    fn default() -> Self {
        BlockingMode::Default
    }
}
