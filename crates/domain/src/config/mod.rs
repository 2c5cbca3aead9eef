//! Configuration structures, organized by concern:
//! - `dns`: forwarding pipeline settings
//! - `access`: client allow/block lists
//! - `server`: listener binding
//! - `logging`: log level

pub mod access;
pub mod dns;
pub mod logging;
pub mod server;

pub use access::AccessConfig;
pub use dns::{DdrConfig, DnsConfig, DomainUpstreams, IpsetRule, UpstreamMode};
pub use logging::LoggingConfig;
pub use server::ServerConfig;

use crate::errors::ForwardError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, ForwardError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ForwardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ForwardError> {
        self.dns.validate()?;
        Ok(())
    }
}
