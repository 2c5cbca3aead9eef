//! Shared fixtures for the workspace flows.

use async_trait::async_trait;
use bastion_dns_application::ports::UpstreamResolver;
use bastion_dns_domain::{DnsProto, ForwardError};
use bastion_dns_infrastructure::dns::context::DnsContext;
use bytes::Bytes;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Upstream answering fixed A records; everything else is NXDOMAIN.
pub struct StaticUpstream {
    address: String,
    zones: Mutex<HashMap<String, std::net::Ipv4Addr>>,
}

impl StaticUpstream {
    pub fn new(address: &str, zones: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            zones: Mutex::new(
                zones
                    .iter()
                    .map(|(host, ip)| (host.to_string(), ip.parse().unwrap()))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl UpstreamResolver for StaticUpstream {
    async fn exchange(&self, request: Bytes) -> Result<Bytes, ForwardError> {
        let request = Message::from_vec(&request).map_err(|e| ForwardError::Upstream {
            server: self.address.clone(),
            reason: e.to_string(),
        })?;
        let query = request
            .queries()
            .first()
            .cloned()
            .ok_or_else(|| ForwardError::BadRequest("no question".into()))?;

        let mut response = Message::new(request.id(), MessageType::Response, OpCode::Query);
        response.add_query(query.clone());

        let host = query.name().to_ascii().to_ascii_lowercase();
        match self.zones.lock().unwrap().get(&host) {
            Some(ip) if query.query_type() == RecordType::A => {
                response.set_response_code(ResponseCode::NoError);
                response.add_answer(Record::from_rdata(
                    query.name().clone(),
                    300,
                    RData::A(A(*ip)),
                ));
            }
            _ => {
                response.set_response_code(ResponseCode::NXDomain);
            }
        }

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

pub fn client_ctx(host: &str, qtype: RecordType, client: &str) -> DnsContext {
    let mut msg = Message::new(77, MessageType::Query, OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_ascii(host).unwrap(), qtype));
    DnsContext::new(msg, format!("{client}:40000").parse().unwrap(), DnsProto::Udp)
}
