//! Per-request state threaded through the pipeline.

use bastion_dns_domain::{DnsProto, FilterResult, FilteringSettings, ForwardError, RecordType};
use hickory_proto::op::{Message, Query};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use super::message;

/// Shared context of one request. Owned by the pipeline runner; never
/// visible to another task.
pub struct DnsContext {
    pub proto: DnsProto,
    pub request: Message,
    /// First non-nil response wins; later stages leave it alone unless an
    /// explicit rewrite replaces it.
    pub response: Option<Message>,
    pub client_addr: SocketAddr,
    /// Correlation identifier supplied by the transport (TLS SNI label,
    /// DoH path segment), not yet validated.
    pub transport_client_id: Option<String>,
    /// Ambient deadline propagated from the transport.
    pub deadline: Option<Instant>,

    /// Validated client identifier; empty when absent.
    pub client_id: Arc<str>,
    pub settings: FilteringSettings,
    pub filter_result: Option<FilterResult>,
    /// Unfiltered upstream answer, kept when filters replaced it.
    pub orig_response: Option<Message>,
    /// Pre-rewrite question, kept when a rewrite replaced it.
    pub orig_question: Option<Query>,
    /// Address parsed from a PTR question in a locally-served range.
    pub unreversed_ip: Option<IpAddr>,

    pub start_time: Instant,
    /// First stage failure, recorded before surfacing to the transport.
    pub err: Option<ForwardError>,

    pub protection_enabled: bool,
    pub response_from_upstream: bool,
    /// Caller set AD or the DO EDNS flag; governs AD-bit hygiene.
    pub response_ad: bool,
    pub is_local_client: bool,
    pub is_dhcp_host: bool,
    pub cached: bool,
    pub skip_telemetry: bool,
    pub enable_compression: bool,
    pub upstream_addr: Option<Arc<str>>,
}

impl DnsContext {
    pub fn new(request: Message, client_addr: SocketAddr, proto: DnsProto) -> Self {
        Self {
            proto,
            request,
            response: None,
            client_addr,
            transport_client_id: None,
            deadline: None,
            client_id: Arc::from(""),
            settings: FilteringSettings::default(),
            filter_result: None,
            orig_response: None,
            orig_question: None,
            unreversed_ip: None,
            start_time: Instant::now(),
            err: None,
            protection_enabled: true,
            response_from_upstream: false,
            response_ad: false,
            is_local_client: false,
            is_dhcp_host: false,
            cached: false,
            skip_telemetry: false,
            enable_compression: false,
            upstream_addr: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.transport_client_id = Some(client_id.into());
        self
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client_addr.ip()
    }

    /// Lower-cased question name without the trailing dot, plus its type.
    pub fn question(&self) -> Option<(String, RecordType)> {
        message::question(&self.request)
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Replace the response, keeping the previous one as the original
    /// upstream answer if none was saved yet.
    pub fn replace_response(&mut self, response: Message) {
        if let Some(previous) = self.response.take() {
            if self.orig_response.is_none() {
                self.orig_response = Some(previous);
            }
        }
        self.response = Some(response);
    }
}
