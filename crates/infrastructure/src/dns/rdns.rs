//! Reverse-DNS helpers: `.arpa` name parsing and the RFC 6303
//! locally-served network set.

use bastion_dns_application::ports::PrivateNets;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const IN_ADDR_SUFFIX: &str = ".in-addr.arpa";
const IP6_SUFFIX: &str = ".ip6.arpa";

/// Parse the address out of a PTR question name.
///
/// Returns `None` for anything that is not a complete `in-addr.arpa` /
/// `ip6.arpa` name; such questions (DNS-SD, SRV-style names) pass through
/// the pipeline untouched.
pub fn unreverse_addr(name: &str) -> Option<IpAddr> {
    let mut name = name.to_ascii_lowercase();
    if name.ends_with('.') {
        name.pop();
    }

    if let Some(prefix) = name.strip_suffix(IN_ADDR_SUFFIX) {
        return unreverse_v4(prefix).map(IpAddr::V4);
    }
    if let Some(prefix) = name.strip_suffix(IP6_SUFFIX) {
        return unreverse_v6(prefix).map(IpAddr::V6);
    }
    None
}

fn unreverse_v4(labels: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for label in labels.split('.') {
        if count == 4 {
            return None;
        }
        // No leading zeros, no empty labels.
        if label.is_empty() || (label.len() > 1 && label.starts_with('0')) {
            return None;
        }
        let octet: u8 = label.parse().ok()?;
        // Labels arrive least-significant first.
        octets[3 - count] = octet;
        count += 1;
    }
    if count != 4 {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

fn unreverse_v6(labels: &str) -> Option<Ipv6Addr> {
    let mut bytes = [0u8; 16];
    let mut count = 0;
    for label in labels.split('.') {
        if count == 32 || label.len() != 1 {
            return None;
        }
        let nibble = u8::from_str_radix(label, 16).ok()?;
        let byte_index = 15 - count / 2;
        if count % 2 == 0 {
            bytes[byte_index] |= nibble;
        } else {
            bytes[byte_index] |= nibble << 4;
        }
        count += 1;
    }
    if count != 32 {
        return None;
    }
    Some(Ipv6Addr::from(bytes))
}

/// Default locally-served ranges (RFC 6303), consulted for the
/// local-client decision and the private-PTR restriction.
pub struct Rfc6303Nets {
    nets: Vec<IpNetwork>,
}

impl Rfc6303Nets {
    pub fn new() -> Self {
        let nets = [
            "0.0.0.0/8",
            "10.0.0.0/8",
            "127.0.0.0/8",
            "169.254.0.0/16",
            "172.16.0.0/12",
            "192.0.2.0/24",
            "192.168.0.0/16",
            "198.51.100.0/24",
            "203.0.113.0/24",
            "::/128",
            "::1/128",
            "2001:db8::/32",
            "fd00::/8",
            "fe80::/10",
        ]
        .iter()
        .map(|net| net.parse().expect("static CIDR"))
        .collect();

        Self { nets }
    }
}

impl Default for Rfc6303Nets {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivateNets for Rfc6303Nets {
    fn contains(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(ip))
    }
}
