use serde::{Deserialize, Serialize};

/// DNS record types the forwarder inspects.
///
/// The wire codec deals in the full registry; the domain layer only needs
/// the types that drive policy (filtering, local answers, DDR, telemetry).
/// Everything else travels as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    PTR,
    TXT,
    SRV,
    SOA,
    NS,
    MX,
    SVCB,
    HTTPS,
    ANY,
    Other(u16),
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::PTR => "PTR",
            RecordType::TXT => "TXT",
            RecordType::SRV => "SRV",
            RecordType::SOA => "SOA",
            RecordType::NS => "NS",
            RecordType::MX => "MX",
            RecordType::SVCB => "SVCB",
            RecordType::HTTPS => "HTTPS",
            RecordType::ANY => "ANY",
            RecordType::Other(_) => "OTHER",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::AAAA),
            "CNAME" => Some(RecordType::CNAME),
            "PTR" => Some(RecordType::PTR),
            "TXT" => Some(RecordType::TXT),
            "SRV" => Some(RecordType::SRV),
            "SOA" => Some(RecordType::SOA),
            "NS" => Some(RecordType::NS),
            "MX" => Some(RecordType::MX),
            "SVCB" => Some(RecordType::SVCB),
            "HTTPS" => Some(RecordType::HTTPS),
            "ANY" => Some(RecordType::ANY),
            _ => None,
        }
    }

    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::AAAA)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::Other(code) => write!(f, "TYPE{code}"),
            other => f.write_str(other.as_str()),
        }
    }
}
