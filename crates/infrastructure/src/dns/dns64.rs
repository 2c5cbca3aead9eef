//! DNS64 synthesis (RFC 6147): AAAA answers mapped from A answers
//! through a /96 NAT64 prefix, and PTR unmapping on the reverse path.

use bastion_dns_domain::ForwardError;
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::AAAA;
use hickory_proto::rr::{DNSClass, RData, Record};
use std::net::{Ipv4Addr, Ipv6Addr};

/// The well-known NAT64 prefix, 64:ff9b::/96.
pub const WELL_KNOWN_PREFIX: Ipv6Addr = Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0);

/// Cap on the TTL of synthesized AAAA records (RFC 6147 §5.1.7).
pub const MAX_SYNTH_TTL: u32 = 600;

#[derive(Debug, Clone, Copy)]
pub struct Dns64Synthesizer {
    /// Upper 96 bits of the prefix; the low 32 are always zero.
    prefix: u128,
}

impl Dns64Synthesizer {
    pub fn new(prefix: Ipv6Addr) -> Self {
        Self {
            prefix: u128::from(prefix) & !0xffff_ffffu128,
        }
    }

    /// First configured /96, or the well-known prefix when none is given.
    pub fn from_config(prefixes: &[String]) -> Result<Self, ForwardError> {
        match prefixes.first() {
            None => Ok(Self::new(WELL_KNOWN_PREFIX)),
            Some(prefix) => {
                let net: ipnetwork::Ipv6Network = prefix
                    .parse()
                    .map_err(|e| ForwardError::Config(format!("bad DNS64 prefix {prefix:?}: {e}")))?;
                if net.prefix() != 96 {
                    return Err(ForwardError::Config(format!(
                        "DNS64 prefix {prefix:?} is /{}, want /96",
                        net.prefix()
                    )));
                }
                Ok(Self::new(net.ip()))
            }
        }
    }

    /// `prefix || v4`.
    pub fn map(&self, v4: Ipv4Addr) -> Ipv6Addr {
        Ipv6Addr::from(self.prefix | u128::from(u32::from(v4)))
    }

    /// Inverse of [`map`](Self::map) for addresses inside the prefix.
    pub fn unmap(&self, v6: Ipv6Addr) -> Option<Ipv4Addr> {
        let bits = u128::from(v6);
        if bits & !0xffff_ffffu128 != self.prefix {
            return None;
        }
        Some(Ipv4Addr::from(bits as u32))
    }

    pub fn contains(&self, v6: Ipv6Addr) -> bool {
        self.unmap(v6).is_some()
    }

    /// Whether an AAAA answer calls for synthesis: a negative NOERROR
    /// answer with no AAAA records in it.
    pub fn should_synthesize(response: &Message) -> bool {
        use hickory_proto::op::ResponseCode;
        response.response_code() == ResponseCode::NoError
            && !response
                .answers()
                .iter()
                .any(|r| matches!(r.data(), RData::AAAA(_)))
    }

    /// TTL for synthesized records: the SOA TTL of the negative AAAA
    /// answer, capped at [`MAX_SYNTH_TTL`].
    pub fn synthesis_ttl(aaaa_response: &Message) -> u32 {
        let soa_ttl = aaaa_response.name_servers().iter().find_map(|r| {
            if let RData::SOA(soa) = r.data() {
                Some(soa.minimum().min(r.ttl()))
            } else {
                None
            }
        });
        soa_ttl.unwrap_or(MAX_SYNTH_TTL).min(MAX_SYNTH_TTL)
    }

    /// Map the A answers of `a_response` into AAAA records. CNAME links
    /// are preserved so the chain stays intact; all records get `ttl`.
    pub fn synthesize(&self, a_response: &Message, ttl: u32) -> Vec<Record> {
        let mut records = Vec::with_capacity(a_response.answers().len());
        for record in a_response.answers() {
            match record.data() {
                RData::A(a) => {
                    let mapped = self.map(a.0);
                    let mut synth =
                        Record::from_rdata(record.name().clone(), ttl, RData::AAAA(AAAA(mapped)));
                    synth.set_dns_class(DNSClass::IN);
                    records.push(synth);
                }
                RData::CNAME(_) => {
                    let mut cname = record.clone();
                    cname.set_ttl(ttl);
                    records.push(cname);
                }
                _ => {}
            }
        }
        records
    }
}

impl Default for Dns64Synthesizer {
    fn default() -> Self {
        Self::new(WELL_KNOWN_PREFIX)
    }
}
