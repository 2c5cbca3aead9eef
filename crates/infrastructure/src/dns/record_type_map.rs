use bastion_dns_domain::RecordType;
use hickory_proto::rr::RecordType as WireRecordType;

/// Maps between the domain-layer record types and the wire codec's.
pub struct RecordTypeMapper;

impl RecordTypeMapper {
    pub fn to_wire(record_type: RecordType) -> WireRecordType {
        match record_type {
            RecordType::A => WireRecordType::A,
            RecordType::AAAA => WireRecordType::AAAA,
            RecordType::CNAME => WireRecordType::CNAME,
            RecordType::PTR => WireRecordType::PTR,
            RecordType::TXT => WireRecordType::TXT,
            RecordType::SRV => WireRecordType::SRV,
            RecordType::SOA => WireRecordType::SOA,
            RecordType::NS => WireRecordType::NS,
            RecordType::MX => WireRecordType::MX,
            RecordType::SVCB => WireRecordType::SVCB,
            RecordType::HTTPS => WireRecordType::HTTPS,
            RecordType::ANY => WireRecordType::ANY,
            RecordType::Other(code) => WireRecordType::from(code),
        }
    }

    pub fn from_wire(record_type: WireRecordType) -> RecordType {
        match record_type {
            WireRecordType::A => RecordType::A,
            WireRecordType::AAAA => RecordType::AAAA,
            WireRecordType::CNAME => RecordType::CNAME,
            WireRecordType::PTR => RecordType::PTR,
            WireRecordType::TXT => RecordType::TXT,
            WireRecordType::SRV => RecordType::SRV,
            WireRecordType::SOA => RecordType::SOA,
            WireRecordType::NS => RecordType::NS,
            WireRecordType::MX => RecordType::MX,
            WireRecordType::SVCB => RecordType::SVCB,
            WireRecordType::HTTPS => RecordType::HTTPS,
            WireRecordType::ANY => RecordType::ANY,
            other => RecordType::Other(u16::from(other)),
        }
    }
}
