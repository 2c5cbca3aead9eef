use async_trait::async_trait;
use bastion_dns_domain::ForwardError;
use bytes::Bytes;

/// A configured transport handle to an external recursive resolver.
///
/// The request and response travel as wire bytes; the codec stays on the
/// infrastructure side of this boundary.
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    async fn exchange(&self, request: Bytes) -> Result<Bytes, ForwardError>;

    /// Stable address string, e.g. `9.9.9.9:53`, used for telemetry and
    /// error reporting.
    fn address(&self) -> &str;
}
