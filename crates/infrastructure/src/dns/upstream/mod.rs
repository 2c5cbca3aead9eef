//! Upstream selection: which resolvers a request goes to.
//!
//! Precedence per request:
//! 1. the client's own upstream set (by client-id, then by address),
//! 2. the longest matching domain override (`#` falls back to default),
//! 3. the default set.
//!
//! PTR questions in locally-served ranges never get here; the pipeline
//! routes them to the private-RDNS set directly.

pub mod exchange;

pub use exchange::{ExchangeOutcome, UpstreamExchanger};

use bastion_dns_application::ports::{ClientsContainer, UpstreamResolver};
use bastion_dns_domain::{DomainUpstreams, ForwardError};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

struct DomainOverride {
    rule: DomainUpstreams,
    /// `None` encodes the `#` marker: fall through to the default set.
    upstreams: Option<Vec<Arc<dyn UpstreamResolver>>>,
}

pub struct UpstreamSelector {
    default_upstreams: Vec<Arc<dyn UpstreamResolver>>,
    overrides: Vec<DomainOverride>,
    private_upstreams: Vec<Arc<dyn UpstreamResolver>>,
    clients: Option<Arc<dyn ClientsContainer>>,
}

impl UpstreamSelector {
    pub fn new(default_upstreams: Vec<Arc<dyn UpstreamResolver>>) -> Self {
        Self {
            default_upstreams,
            overrides: Vec::new(),
            private_upstreams: Vec::new(),
            clients: None,
        }
    }

    pub fn with_override(
        mut self,
        rule: DomainUpstreams,
        upstreams: Option<Vec<Arc<dyn UpstreamResolver>>>,
    ) -> Self {
        self.overrides.push(DomainOverride { rule, upstreams });
        self
    }

    pub fn with_private_upstreams(
        mut self,
        upstreams: Vec<Arc<dyn UpstreamResolver>>,
    ) -> Self {
        self.private_upstreams = upstreams;
        self
    }

    pub fn with_clients(mut self, clients: Arc<dyn ClientsContainer>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn clients(&self) -> Option<&Arc<dyn ClientsContainer>> {
        self.clients.as_ref()
    }

    pub fn private_upstreams(&self) -> &[Arc<dyn UpstreamResolver>] {
        &self.private_upstreams
    }

    pub fn has_private_upstreams(&self) -> bool {
        !self.private_upstreams.is_empty()
    }

    /// Upstream set for one request.
    pub fn select(
        &self,
        host: &str,
        client_id: Option<&str>,
        client_ip: IpAddr,
    ) -> Result<Vec<Arc<dyn UpstreamResolver>>, ForwardError> {
        if let Some(clients) = &self.clients {
            if let Some(custom) = clients.upstreams_for(client_id, client_ip)? {
                if !custom.upstreams.is_empty() {
                    debug!(client = %client_ip, "using per-client upstreams");
                    return Ok(custom.upstreams);
                }
            }
        }

        if let Some(winner) = self
            .overrides
            .iter()
            .filter(|o| o.rule.matches_domain(host))
            .max_by_key(|o| o.rule.specificity())
        {
            match &winner.upstreams {
                Some(upstreams) if !upstreams.is_empty() => {
                    debug!(host, domain = %winner.rule.domain, "using domain upstreams");
                    return Ok(upstreams.clone());
                }
                // `#`: an exception carved out of a broader override.
                _ => {}
            }
        }

        if self.default_upstreams.is_empty() {
            return Err(ForwardError::NoUpstreams);
        }
        Ok(self.default_upstreams.clone())
    }
}
