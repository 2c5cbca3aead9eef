pub mod clients;
pub mod dhcp;
pub mod filter;
pub mod hosts;
pub mod ipset;
pub mod private_nets;
pub mod query_log;
pub mod stats;
pub mod upstream;

pub use clients::{ClientUpstreams, ClientsContainer};
pub use dhcp::{DhcpLease, DhcpServer, LeaseChangeHook};
pub use filter::{FilterEngine, FilterRequest};
pub use hosts::{HostsContainer, HostsMatch};
pub use ipset::IpsetManager;
pub use private_nets::PrivateNets;
pub use query_log::{QueryLogSink, QueryRecord};
pub use stats::{StatsEntry, StatsResult, StatsSink};
pub use upstream::UpstreamResolver;
