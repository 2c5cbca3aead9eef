//! In-memory collaborators for pipeline tests.

use async_trait::async_trait;
use bastion_dns_application::ports::{
    ClientUpstreams, ClientsContainer, DhcpLease, DhcpServer, FilterEngine, FilterRequest,
    LeaseChangeHook, QueryLogSink, QueryRecord, StatsEntry, StatsSink, UpstreamResolver,
};
use bastion_dns_domain::{
    FilterReason, FilterResult, FilteringSettings, ForwardError, RecordType,
};
use bytes::Bytes;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME, PTR, SOA};
use hickory_proto::rr::{Name, RData, Record, RecordType as WireRecordType};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

pub fn query(id: u16, host: &str, qtype: WireRecordType) -> Message {
    let mut msg = Message::new(id, MessageType::Query, OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(hickory_proto::op::Query::query(
        Name::from_ascii(host).unwrap(),
        qtype,
    ));
    msg
}

pub fn a_record(host: &str, ip: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_ascii(host).unwrap(),
        ttl,
        RData::A(A(ip.parse().unwrap())),
    )
}

pub fn cname_record(host: &str, target: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_ascii(host).unwrap(),
        ttl,
        RData::CNAME(CNAME(Name::from_ascii(target).unwrap())),
    )
}

pub fn ptr_record(host: &str, target: &str, ttl: u32) -> Record {
    Record::from_rdata(
        Name::from_ascii(host).unwrap(),
        ttl,
        RData::PTR(PTR(Name::from_ascii(target).unwrap())),
    )
}

pub fn answer(answers: Vec<Record>) -> Message {
    let mut msg = Message::new(0, MessageType::Response, OpCode::Query);
    msg.set_response_code(ResponseCode::NoError);
    for record in answers {
        msg.add_answer(record);
    }
    msg
}

pub fn nodata_with_soa(zone: &str, soa_ttl: u32) -> Message {
    let mut msg = Message::new(0, MessageType::Response, OpCode::Query);
    msg.set_response_code(ResponseCode::NoError);
    let soa = SOA::new(
        Name::from_ascii("ns.example.").unwrap(),
        Name::from_ascii("hostmaster.example.").unwrap(),
        1,
        3600,
        1800,
        604_800,
        soa_ttl,
    );
    msg.add_name_server(Record::from_rdata(
        Name::from_ascii(zone).unwrap(),
        soa_ttl,
        RData::SOA(soa),
    ));
    msg
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

/// Scripted upstream: canned responses keyed by (host, qtype).
pub struct MockUpstream {
    address: String,
    responses: Mutex<HashMap<(String, WireRecordType), Message>>,
    pub exchanges: AtomicUsize,
}

impl MockUpstream {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            responses: Mutex::new(HashMap::new()),
            exchanges: AtomicUsize::new(0),
        })
    }

    pub fn respond(&self, host: &str, qtype: WireRecordType, response: Message) {
        self.responses
            .lock()
            .unwrap()
            .insert((host.to_ascii_lowercase(), qtype), response);
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamResolver for MockUpstream {
    async fn exchange(&self, request: Bytes) -> Result<Bytes, ForwardError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let request = Message::from_vec(&request).map_err(|e| ForwardError::Upstream {
            server: self.address.clone(),
            reason: e.to_string(),
        })?;
        let query = request.queries().first().cloned().ok_or_else(|| {
            ForwardError::Upstream {
                server: self.address.clone(),
                reason: "no question".to_string(),
            }
        })?;
        let key = (
            query.name().to_ascii().to_ascii_lowercase(),
            query.query_type(),
        );

        let mut response = match self.responses.lock().unwrap().get(&key) {
            Some(canned) => canned.clone(),
            None => {
                let mut nx = Message::new(0, MessageType::Response, OpCode::Query);
                nx.set_response_code(ResponseCode::NXDomain);
                nx
            }
        };
        let mut header = *response.header();
        header.set_id(request.id());
        response.set_header(header);
        response.take_queries();
        response.add_query(query);

        Ok(Bytes::from(response.to_vec().map_err(|e| {
            ForwardError::Upstream {
                server: self.address.clone(),
                reason: e.to_string(),
            }
        })?))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

// ---------------------------------------------------------------------------
// Filter engine
// ---------------------------------------------------------------------------

/// Blocks exact hosts on the request and response path; no rewrites.
#[derive(Default)]
pub struct MockFilterEngine {
    blocked: Vec<String>,
}

impl MockFilterEngine {
    pub fn blocking(hosts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            blocked: hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        })
    }

    fn matches(&self, host: &str) -> bool {
        self.blocked.iter().any(|b| b == host)
    }
}

#[async_trait]
impl FilterEngine for MockFilterEngine {
    async fn filter_request(&self, request: &FilterRequest) -> FilterResult {
        if self.matches(&request.host) {
            FilterResult::blocked(FilterReason::FilteredBlockList, request.host.to_string())
        } else {
            FilterResult::not_filtered()
        }
    }

    async fn filter_response(
        &self,
        _request: &FilterRequest,
        answer_hosts: &[Arc<str>],
    ) -> Option<FilterResult> {
        for host in answer_hosts {
            if self.matches(host) {
                return Some(FilterResult::blocked(
                    FilterReason::FilteredBlockList,
                    host.to_string(),
                ));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockQueryLog {
    pub records: Mutex<Vec<QueryRecord>>,
}

impl MockQueryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn logged_hosts(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.question_host.to_string())
            .collect()
    }
}

#[async_trait]
impl QueryLogSink for MockQueryLog {
    fn should_log(
        &self,
        _host: &str,
        _qtype: RecordType,
        _client_ip: IpAddr,
        _client_ids: &[&str],
    ) -> bool {
        true
    }

    async fn add(&self, record: QueryRecord) {
        self.records.lock().unwrap().push(record);
    }
}

#[derive(Default)]
pub struct MockStats {
    pub entries: Mutex<Vec<StatsEntry>>,
}

impl MockStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl StatsSink for MockStats {
    fn should_count(
        &self,
        _host: &str,
        _qtype: RecordType,
        _client_ip: IpAddr,
        _client_ids: &[&str],
    ) -> bool {
        true
    }

    async fn update(&self, entry: StatsEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

// ---------------------------------------------------------------------------
// DHCP
// ---------------------------------------------------------------------------

pub struct MockDhcp {
    leases: Vec<DhcpLease>,
}

impl MockDhcp {
    pub fn with_leases(leases: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            leases: leases
                .iter()
                .map(|(host, ip)| DhcpLease {
                    hostname: Arc::from(*host),
                    ip: ip.parse().unwrap(),
                })
                .collect(),
        })
    }
}

impl DhcpServer for MockDhcp {
    fn enabled(&self) -> bool {
        true
    }

    fn ip_by_host(&self, host: &str) -> Option<IpAddr> {
        self.leases
            .iter()
            .find(|l| &*l.hostname == host)
            .map(|l| l.ip)
    }

    fn host_by_ip(&self, ip: IpAddr) -> Option<Arc<str>> {
        self.leases
            .iter()
            .find(|l| l.ip == ip)
            .map(|l| Arc::clone(&l.hostname))
    }

    fn leases(&self) -> Vec<DhcpLease> {
        self.leases.clone()
    }

    fn on_lease_change(&self, _hook: LeaseChangeHook) {}
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

pub struct MockClients {
    pub client_id: String,
    pub upstreams: Vec<Arc<dyn UpstreamResolver>>,
}

impl ClientsContainer for MockClients {
    fn upstreams_for(
        &self,
        client_id: Option<&str>,
        _addr: IpAddr,
    ) -> Result<Option<ClientUpstreams>, ForwardError> {
        if client_id == Some(self.client_id.as_str()) {
            Ok(Some(ClientUpstreams {
                upstreams: self.upstreams.clone(),
            }))
        } else {
            Ok(None)
        }
    }

    fn filtering_settings_for(
        &self,
        _client_id: Option<&str>,
        _addr: IpAddr,
    ) -> Option<FilteringSettings> {
        None
    }
}
