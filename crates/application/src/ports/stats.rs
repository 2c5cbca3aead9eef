use async_trait::async_trait;
use bastion_dns_domain::RecordType;
use std::net::IpAddr;
use std::sync::Arc;

/// Bucket a finished query falls into for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsResult {
    NotFiltered,
    Filtered,
    SafeBrowsing,
    SafeSearch,
    Parental,
}

impl StatsResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsResult::NotFiltered => "not_filtered",
            StatsResult::Filtered => "filtered",
            StatsResult::SafeBrowsing => "safe_browsing",
            StatsResult::SafeSearch => "safe_search",
            StatsResult::Parental => "parental",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsEntry {
    /// Lower-cased question name without the trailing dot.
    pub domain: Arc<str>,
    /// Client identifier if set, else the (anonymized) address string.
    pub client: Arc<str>,
    pub elapsed_us: u64,
    pub result: StatsResult,
}

/// Statistics storage collaborator.
#[async_trait]
pub trait StatsSink: Send + Sync {
    fn should_count(
        &self,
        host: &str,
        qtype: RecordType,
        client_ip: IpAddr,
        client_ids: &[&str],
    ) -> bool;

    async fn update(&self, entry: StatsEntry);
}
