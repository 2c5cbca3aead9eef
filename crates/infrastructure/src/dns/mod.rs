pub mod access;
pub mod context;
pub mod ddr;
pub mod dns64;
pub mod filter_bridge;
pub mod handler;
pub mod ipset;
pub mod local_names;
pub mod message;
pub mod pipeline;
pub mod rdns;
pub mod record_type_map;
pub mod recursion;
pub mod server;
pub mod telemetry;
pub mod transport;
pub mod upstream;

pub use access::AccessManager;
pub use context::DnsContext;
pub use ddr::DdrResponder;
pub use dns64::Dns64Synthesizer;
pub use filter_bridge::{BlockingPolicy, FilterBridge};
pub use handler::ForwarderHandler;
pub use ipset::IpsetDispatcher;
pub use local_names::LocalNameService;
pub use pipeline::{Stage, StageFlow};
pub use rdns::Rfc6303Nets;
pub use recursion::RecursionDetector;
pub use server::{DnsForwarder, ServerState};
pub use telemetry::TelemetrySink;
pub use upstream::{UpstreamExchanger, UpstreamSelector};
