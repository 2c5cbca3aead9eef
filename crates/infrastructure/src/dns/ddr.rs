//! Discovery of Designated Resolvers (RFC 9462).
//!
//! Questions for `_dns.resolver.arpa.` are answered locally with SVCB
//! records advertising the server's encrypted endpoints; they never reach
//! an upstream.

use bastion_dns_domain::{DdrConfig, RecordType};
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::svcb::{Alpn, SvcParamKey, SvcParamValue, Unknown, SVCB};
use hickory_proto::rr::{DNSClass, Name, RData, Record};

use super::message;

pub const DDR_DOMAIN: &str = "_dns.resolver.arpa";

const DDR_TTL: u32 = 600;
const SVC_PRIORITY: u16 = 1;
/// SvcParamKey number for `dohpath` (RFC 9461).
const KEY_DOHPATH: u16 = 7;

pub struct DdrResponder {
    enabled: bool,
    target: Option<Name>,
    config: DdrConfig,
}

impl DdrResponder {
    pub fn new(enabled: bool, server_name: &str, config: DdrConfig) -> Self {
        let target = if server_name.is_empty() {
            None
        } else {
            message::absolute_name(server_name)
        };
        Self {
            enabled,
            target,
            config,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            target: None,
            config: DdrConfig::default(),
        }
    }

    /// Whether this responder owns the question.
    pub fn handles(&self, host: &str) -> bool {
        self.enabled && host == DDR_DOMAIN
    }

    /// Answer for a DDR question. SVCB gets the endpoint advertisement;
    /// any other type at the same name gets an empty NODATA answer.
    pub fn respond(&self, request: &Message, qtype: RecordType) -> Message {
        if qtype != RecordType::SVCB {
            return message::nodata(request);
        }

        let records = self.svcb_records(request);
        if records.is_empty() {
            return message::nodata(request);
        }
        message::with_answers(request, records)
    }

    fn svcb_records(&self, request: &Message) -> Vec<Record> {
        let Some(target) = &self.target else {
            return Vec::new();
        };
        let Some(owner) = request.queries().first().map(|q| q.name().clone()) else {
            return Vec::new();
        };

        let mut records = Vec::new();

        if let Some(port) = self.config.https_port {
            let mut params = vec![
                alpn_param("h2"),
                (SvcParamKey::Port, SvcParamValue::Port(port)),
            ];
            params.push((
                SvcParamKey::Key(KEY_DOHPATH),
                SvcParamValue::Unknown(Unknown(self.config.doh_path.as_bytes().to_vec())),
            ));
            records.push(svcb_record(owner.clone(), target.clone(), params));
        }

        // DoT is only advertised when the certificate can be validated
        // against a bare address.
        if self.config.has_ip_addrs {
            if let Some(port) = self.config.tls_port {
                let params = vec![
                    alpn_param("dot"),
                    (SvcParamKey::Port, SvcParamValue::Port(port)),
                ];
                records.push(svcb_record(owner.clone(), target.clone(), params));
            }
        }

        if let Some(port) = self.config.quic_port {
            let params = vec![
                alpn_param("doq"),
                (SvcParamKey::Port, SvcParamValue::Port(port)),
            ];
            records.push(svcb_record(owner, target.clone(), params));
        }

        records
    }
}

fn alpn_param(protocol: &str) -> (SvcParamKey, SvcParamValue) {
    (
        SvcParamKey::Alpn,
        SvcParamValue::Alpn(Alpn(vec![protocol.to_string()])),
    )
}

fn svcb_record(owner: Name, target: Name, params: Vec<(SvcParamKey, SvcParamValue)>) -> Record {
    let svcb = SVCB::new(SVC_PRIORITY, target, params);
    let mut record = Record::from_rdata(owner, DDR_TTL, RData::SVCB(svcb));
    record.set_dns_class(DNSClass::IN);
    record
}
