//! Bastion DNS Domain Layer
pub mod config;
pub mod errors;
pub mod filtering;
pub mod proto;
pub mod record_type;
pub mod validators;

pub use config::{AccessConfig, Config, DdrConfig, DnsConfig, DomainUpstreams, UpstreamMode};
pub use errors::ForwardError;
pub use filtering::{BlockingMode, FilterReason, FilterResult, FilteringSettings};
pub use proto::DnsProto;
pub use record_type::RecordType;
