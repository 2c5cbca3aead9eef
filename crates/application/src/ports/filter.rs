use async_trait::async_trait;
use bastion_dns_domain::{FilterResult, FilteringSettings, RecordType};
use std::net::IpAddr;
use std::sync::Arc;

/// The filter engine's view of one request.
#[derive(Debug, Clone)]
pub struct FilterRequest {
    /// Question name, lower-cased, without the trailing dot.
    pub host: Arc<str>,
    pub qtype: RecordType,
    pub client_ip: IpAddr,
    /// Empty when the transport supplied no identifier.
    pub client_id: Arc<str>,
    pub settings: FilteringSettings,
}

/// External rule engine for request- and response-time filtering.
///
/// Filtering never fails: "no decision" is expressed through the
/// `NotFiltered` reason, not an error.
#[async_trait]
pub trait FilterEngine: Send + Sync {
    async fn filter_request(&self, request: &FilterRequest) -> FilterResult;

    /// Re-check the names an upstream answer introduced (CNAME targets
    /// and address-record owners). `None` means the answer stands.
    async fn filter_response(
        &self,
        request: &FilterRequest,
        answer_hosts: &[Arc<str>],
    ) -> Option<FilterResult>;
}
