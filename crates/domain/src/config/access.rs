use serde::{Deserialize, Serialize};

/// Raw client access lists as they appear in the config file.
///
/// Each entry is parsed in order as an IP address, then a CIDR, then a
/// client identifier; the access manager rejects lists whose allow and
/// block sides share an exact entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_clients: Vec<String>,

    #[serde(default)]
    pub blocked_clients: Vec<String>,

    /// Host patterns refused regardless of client: `example.org`,
    /// `*.tracker.example`, optionally qtype-conditioned with a
    /// `$dnstype=HTTPS` suffix.
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
}

impl AccessConfig {
    pub fn is_empty(&self) -> bool {
        self.allowed_clients.is_empty()
            && self.blocked_clients.is_empty()
            && self.blocked_hosts.is_empty()
    }
}
