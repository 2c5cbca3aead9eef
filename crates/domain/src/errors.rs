use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no upstream servers available")]
    NoUpstreams,

    #[error("upstream {server} timed out after {timeout_ms}ms")]
    UpstreamTimeout { server: String, timeout_ms: u64 },

    #[error("upstream {server} failed: {reason}")]
    Upstream { server: String, reason: String },

    #[error("server closed")]
    ServerClosed,

    #[error("ipset update failed: {0}")]
    Ipset(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ForwardError {
    /// True for the "no upstreams" case, which the private-RDNS path maps
    /// to NXDOMAIN instead of surfacing.
    pub fn is_no_upstreams(&self) -> bool {
        matches!(self, ForwardError::NoUpstreams)
    }

    pub fn is_server_closed(&self) -> bool {
        matches!(self, ForwardError::ServerClosed)
    }
}
