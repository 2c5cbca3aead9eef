/// Transport over which a client query arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsProto {
    Udp,
    Tcp,
    Tls,
    Https,
    Quic,
    DnsCrypt,
}

impl DnsProto {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsProto::Udp => "udp",
            DnsProto::Tcp => "tcp",
            DnsProto::Tls => "tls",
            DnsProto::Https => "https",
            DnsProto::Quic => "quic",
            DnsProto::DnsCrypt => "dnscrypt",
        }
    }

    /// Encrypted transports can carry a client identifier (TLS SNI label,
    /// HTTPS path segment, QUIC SNI).
    pub fn supports_client_id(&self) -> bool {
        matches!(self, DnsProto::Tls | DnsProto::Https | DnsProto::Quic)
    }
}

impl Default for DnsProto {
    fn default() -> Self {
        DnsProto::Udp
    }
}
