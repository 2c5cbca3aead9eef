use async_trait::async_trait;
use bastion_dns_domain::{DnsProto, FilterResult, RecordType};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// One anonymized query-log record.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub question_host: Arc<str>,
    pub question_type: RecordType,
    /// Wire bytes of the answer sent to the client, opaque here.
    pub answer: Option<Bytes>,
    /// Wire bytes of the unfiltered upstream answer, when filters
    /// replaced it.
    pub orig_answer: Option<Bytes>,
    pub filter_result: Option<FilterResult>,
    pub elapsed: Duration,
    /// Already anonymized by the caller.
    pub client_ip: IpAddr,
    pub client_id: Arc<str>,
    pub client_proto: DnsProto,
    pub upstream_addr: Option<Arc<str>>,
    pub cached: bool,
    pub authenticated_data: bool,
    pub timestamp: DateTime<Utc>,
}

/// Query-log storage collaborator.
#[async_trait]
pub trait QueryLogSink: Send + Sync {
    fn should_log(
        &self,
        host: &str,
        qtype: RecordType,
        client_ip: IpAddr,
        client_ids: &[&str],
    ) -> bool;

    /// Best effort; implementations must not fail the request path.
    async fn add(&self, record: QueryRecord);
}
