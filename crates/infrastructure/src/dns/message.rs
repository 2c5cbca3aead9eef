//! Reply synthesis helpers.
//!
//! Every synthesized response starts from the request so that the id,
//! question, RD flag, and EDNS presence line up with what the client sent.

use bastion_dns_domain::{BlockingMode, RecordType};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, PTR, SOA};
use hickory_proto::rr::{DNSClass, Name, RData, Record};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::record_type_map::RecordTypeMapper;

/// TTL of the synthetic SOA attached to negative answers.
const NEGATIVE_SOA_TTL: u32 = 900;

/// Empty response skeleton mirroring the request.
pub fn reply_to(request: &Message) -> Message {
    let mut response = Message::new(request.id(), MessageType::Response, OpCode::Query);
    response.set_recursion_desired(request.recursion_desired());
    response.set_recursion_available(true);
    for query in request.queries() {
        response.add_query(query.clone());
    }
    if request.extensions().is_some() {
        let mut edns = Edns::new();
        edns.set_max_payload(1232);
        response.set_edns(edns);
    }
    response
}

pub fn nxdomain(request: &Message) -> Message {
    let mut response = reply_to(request);
    response.set_response_code(ResponseCode::NXDomain);
    if let Some(record) = negative_soa(request) {
        response.add_name_server(record);
    }
    response
}

/// NOERROR with an empty answer section.
pub fn nodata(request: &Message) -> Message {
    let mut response = reply_to(request);
    response.set_response_code(ResponseCode::NoError);
    if let Some(record) = negative_soa(request) {
        response.add_name_server(record);
    }
    response
}

pub fn refused(request: &Message) -> Message {
    let mut response = reply_to(request);
    response.set_response_code(ResponseCode::Refused);
    response
}

pub fn servfail(request: &Message) -> Message {
    let mut response = reply_to(request);
    response.set_response_code(ResponseCode::ServFail);
    response
}

/// Response carrying the given answer records.
pub fn with_answers(request: &Message, answers: Vec<Record>) -> Message {
    let mut response = reply_to(request);
    response.set_response_code(ResponseCode::NoError);
    for record in answers {
        response.add_answer(record);
    }
    response
}

/// Blocked response per the configured blocking mode.
pub fn blocked(
    request: &Message,
    mode: BlockingMode,
    custom_v4: Option<Ipv4Addr>,
    custom_v6: Option<Ipv6Addr>,
    ttl: u32,
) -> Message {
    match mode {
        BlockingMode::Default | BlockingMode::Nxdomain => nxdomain(request),
        BlockingMode::Refused => refused(request),
        BlockingMode::NullIp => {
            blocked_with_ip(request, Ipv4Addr::UNSPECIFIED, Ipv6Addr::UNSPECIFIED, ttl)
        }
        BlockingMode::CustomIp => match (custom_v4, custom_v6) {
            (None, None) => nxdomain(request),
            (v4, v6) => blocked_with_ip(
                request,
                v4.unwrap_or(Ipv4Addr::UNSPECIFIED),
                v6.unwrap_or(Ipv6Addr::UNSPECIFIED),
                ttl,
            ),
        },
    }
}

fn blocked_with_ip(request: &Message, v4: Ipv4Addr, v6: Ipv6Addr, ttl: u32) -> Message {
    let Some(query) = request.queries().first() else {
        return nxdomain(request);
    };
    let name = query.name().clone();

    let record = match RecordTypeMapper::from_wire(query.query_type()) {
        RecordType::A => Some(Record::from_rdata(name, ttl, RData::A(A(v4)))),
        RecordType::AAAA => Some(Record::from_rdata(name, ttl, RData::AAAA(AAAA(v6)))),
        _ => None,
    };

    match record {
        Some(mut record) => {
            record.set_dns_class(DNSClass::IN);
            with_answers(request, vec![record])
        }
        // Non-address question under an IP blocking mode: NODATA.
        None => nodata(request),
    }
}

/// A record answering the question name directly.
pub fn address_record(name: Name, ip: IpAddr, ttl: u32) -> Record {
    let rdata = match ip {
        IpAddr::V4(v4) => RData::A(A(v4)),
        IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
    };
    let mut record = Record::from_rdata(name, ttl, rdata);
    record.set_dns_class(DNSClass::IN);
    record
}

pub fn cname_record(name: Name, target: Name, ttl: u32) -> Record {
    let mut record = Record::from_rdata(name, ttl, RData::CNAME(CNAME(target)));
    record.set_dns_class(DNSClass::IN);
    record
}

pub fn ptr_record(name: Name, target: Name, ttl: u32) -> Record {
    let mut record = Record::from_rdata(name, ttl, RData::PTR(PTR(target)));
    record.set_dns_class(DNSClass::IN);
    record
}

fn negative_soa(request: &Message) -> Option<Record> {
    let query = request.queries().first()?;
    let zone = query.name().base_name();
    let mname = Name::from_ascii("ns.bastion-dns.").ok()?;
    let rname = Name::from_ascii("hostmaster.bastion-dns.").ok()?;
    let soa = SOA::new(mname, rname, 1, 3600, 1800, 604_800, NEGATIVE_SOA_TTL);
    let mut record = Record::from_rdata(zone, NEGATIVE_SOA_TTL, RData::SOA(soa));
    record.set_dns_class(DNSClass::IN);
    Some(record)
}

/// Lower-cased question name without the trailing dot, plus its type.
pub fn question(msg: &Message) -> Option<(String, RecordType)> {
    let query = msg.queries().first()?;
    let mut host = query.name().to_ascii().to_ascii_lowercase();
    if host.ends_with('.') {
        host.pop();
    }
    Some((host, RecordTypeMapper::from_wire(query.query_type())))
}

/// Whether the request has the EDNS DO flag set.
pub fn dnssec_ok(msg: &Message) -> bool {
    msg.extensions()
        .as_ref()
        .map(|edns| edns.flags().dnssec_ok)
        .unwrap_or(false)
}

/// Parse `host` into an absolute wire name.
pub fn absolute_name(host: &str) -> Option<Name> {
    let mut name = Name::from_str(host).ok()?;
    name.set_fqdn(true);
    Some(name)
}
