//! The forwarding server: owns the swappable subsystem snapshot, runs the
//! stage pipeline, and handles reconfiguration and shutdown.

use arc_swap::ArcSwapOption;
use bastion_dns_application::ports::{
    ClientsContainer, DhcpServer, FilterEngine, HostsContainer, IpsetManager, PrivateNets,
    QueryLogSink, StatsSink, UpstreamResolver,
};
use bastion_dns_application::services::IpAnonymizer;
use bastion_dns_domain::{
    validators, AccessConfig, DnsConfig, DomainUpstreams, ForwardError, RecordType,
};
use hickory_proto::op::Message;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use super::access::AccessManager;
use super::context::DnsContext;
use super::ddr::DdrResponder;
use super::dns64::Dns64Synthesizer;
use super::filter_bridge::{BlockingPolicy, FilterBridge};
use super::ipset::{self, IpsetDispatcher};
use super::local_names::LocalNameService;
use super::message;
use super::pipeline::{Stage, StageFlow};
use super::rdns::{self, Rfc6303Nets};
use super::recursion::RecursionDetector;
use super::telemetry::TelemetrySink;
use super::transport::UdpUpstream;
use super::upstream::{UpstreamExchanger, UpstreamSelector};

/// Mozilla's DoH canary: answering NXDOMAIN tells Firefox to keep using
/// the local resolver.
pub const APPLICATION_DNS_CANARY: &str = "use-application-dns.net";

/// Reserved name answered locally so external health checks never leave
/// the process.
pub const HEALTHCHECK_DOMAIN: &str = "healthcheck.bastion-dns.test";

const LOCAL_ANSWER_TTL: u32 = 3600;

type StageResult = Result<StageFlow, ForwardError>;

/// One immutable snapshot of every swappable subsystem. Replaced whole
/// by `reconfigure`; requests hold the snapshot they started with.
pub struct ServerState {
    pub config: DnsConfig,
    pub access: AccessManager,
    pub filter_bridge: FilterBridge,
    pub selector: UpstreamSelector,
    pub exchanger: UpstreamExchanger,
    pub local_names: Arc<LocalNameService>,
    pub telemetry: TelemetrySink,
    pub ipset: IpsetDispatcher,
    pub private_nets: Arc<dyn PrivateNets>,
    pub dns64: Option<Dns64Synthesizer>,
    pub ddr: DdrResponder,
}

impl ServerState {
    pub fn builder(config: DnsConfig) -> ServerStateBuilder {
        ServerStateBuilder::new(config)
    }
}

/// Assembles a [`ServerState`] from the config plus whatever
/// collaborators the deployment wires in; everything is optional except
/// the config.
pub struct ServerStateBuilder {
    config: DnsConfig,
    access: AccessConfig,
    filter: Option<Arc<dyn FilterEngine>>,
    dhcp: Option<Arc<dyn DhcpServer>>,
    hosts: Option<Arc<dyn HostsContainer>>,
    clients: Option<Arc<dyn ClientsContainer>>,
    query_log: Option<Arc<dyn QueryLogSink>>,
    stats: Option<Arc<dyn StatsSink>>,
    ipset_manager: Option<Arc<dyn IpsetManager>>,
    private_nets: Option<Arc<dyn PrivateNets>>,
    default_upstreams: Option<Vec<Arc<dyn UpstreamResolver>>>,
    private_upstreams: Option<Vec<Arc<dyn UpstreamResolver>>>,
}

impl ServerStateBuilder {
    pub fn new(config: DnsConfig) -> Self {
        Self {
            config,
            access: AccessConfig::default(),
            filter: None,
            dhcp: None,
            hosts: None,
            clients: None,
            query_log: None,
            stats: None,
            ipset_manager: None,
            private_nets: None,
            default_upstreams: None,
            private_upstreams: None,
        }
    }

    pub fn access(mut self, access: AccessConfig) -> Self {
        self.access = access;
        self
    }

    pub fn filter_engine(mut self, filter: Arc<dyn FilterEngine>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn dhcp(mut self, dhcp: Arc<dyn DhcpServer>) -> Self {
        self.dhcp = Some(dhcp);
        self
    }

    pub fn hosts(mut self, hosts: Arc<dyn HostsContainer>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    pub fn clients(mut self, clients: Arc<dyn ClientsContainer>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn query_log(mut self, query_log: Arc<dyn QueryLogSink>) -> Self {
        self.query_log = Some(query_log);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn ipset_manager(mut self, manager: Arc<dyn IpsetManager>) -> Self {
        self.ipset_manager = Some(manager);
        self
    }

    pub fn private_nets(mut self, nets: Arc<dyn PrivateNets>) -> Self {
        self.private_nets = Some(nets);
        self
    }

    /// Override the upstream set built from `config.upstream_servers`.
    pub fn default_upstreams(mut self, upstreams: Vec<Arc<dyn UpstreamResolver>>) -> Self {
        self.default_upstreams = Some(upstreams);
        self
    }

    pub fn private_upstreams(mut self, upstreams: Vec<Arc<dyn UpstreamResolver>>) -> Self {
        self.private_upstreams = Some(upstreams);
        self
    }

    pub fn build(self) -> Result<ServerState, ForwardError> {
        let config = self.config;
        config.validate()?;

        let access = AccessManager::from_config(&self.access)?;

        let default_upstreams = match self.default_upstreams {
            Some(upstreams) => upstreams,
            None => build_udp_upstreams(&config.upstream_servers)?,
        };
        let private_upstreams = match self.private_upstreams {
            Some(upstreams) => upstreams,
            None => build_udp_upstreams(&config.private_rdns_upstreams)?,
        };

        let mut selector =
            UpstreamSelector::new(default_upstreams).with_private_upstreams(private_upstreams);
        for rule in &config.domain_upstreams {
            let upstreams = if rule.uses_default() {
                None
            } else {
                Some(build_udp_upstreams(&rule.upstreams)?)
            };
            selector = selector.with_override(
                DomainUpstreams {
                    domain: rule.domain.clone(),
                    upstreams: rule.upstreams.clone(),
                },
                upstreams,
            );
        }
        if let Some(clients) = self.clients {
            selector = selector.with_clients(clients);
        }

        let exchanger = UpstreamExchanger::new(
            config.upstream_mode,
            Duration::from_millis(config.upstream_timeout),
            Duration::from_millis(config.fastest_ping_timeout),
        );

        let filter: Arc<dyn FilterEngine> = self
            .filter
            .unwrap_or_else(|| Arc::new(NullFilterEngine));
        let filter_bridge = FilterBridge::new(filter, BlockingPolicy::from_config(&config));

        let local_names =
            LocalNameService::new(self.dhcp, self.hosts, &config.local_domain_suffix);

        let telemetry = TelemetrySink::new(
            self.query_log,
            self.stats,
            IpAnonymizer::new(config.ratelimit_subnet_len_4, config.ratelimit_subnet_len_6),
            config.refuse_any,
        );

        let ipset = IpsetDispatcher::new(
            &config.ipset_rules,
            ipset::platform_manager(self.ipset_manager),
        );

        let private_nets: Arc<dyn PrivateNets> = self
            .private_nets
            .unwrap_or_else(|| Arc::new(Rfc6303Nets::new()));

        let dns64 = if config.use_dns64 {
            Some(Dns64Synthesizer::from_config(&config.dns64_prefixes)?)
        } else {
            None
        };

        let ddr = DdrResponder::new(config.handle_ddr, &config.server_name, config.ddr.clone());

        Ok(ServerState {
            config,
            access,
            filter_bridge,
            selector,
            exchanger,
            local_names,
            telemetry,
            ipset,
            private_nets,
            dns64,
            ddr,
        })
    }
}

fn build_udp_upstreams(addrs: &[String]) -> Result<Vec<Arc<dyn UpstreamResolver>>, ForwardError> {
    addrs
        .iter()
        .map(|addr| UdpUpstream::from_addr(addr).map(|u| Arc::new(u) as Arc<dyn UpstreamResolver>))
        .collect()
}

/// Rule engine wired when no external filter collaborator is present.
pub struct NullFilterEngine;

#[async_trait::async_trait]
impl FilterEngine for NullFilterEngine {
    async fn filter_request(
        &self,
        _request: &bastion_dns_application::ports::FilterRequest,
    ) -> bastion_dns_domain::FilterResult {
        bastion_dns_domain::FilterResult::not_filtered()
    }

    async fn filter_response(
        &self,
        _request: &bastion_dns_application::ports::FilterRequest,
        _answer_hosts: &[Arc<str>],
    ) -> Option<bastion_dns_domain::FilterResult> {
        None
    }
}

pub struct DnsForwarder {
    state: ArcSwapOption<ServerState>,
    /// Serializes writers; readers never touch it.
    reload_lock: Mutex<()>,
    recursion: RecursionDetector,
    in_flight: AtomicU64,
    drained: Notify,
}

impl DnsForwarder {
    pub fn new(state: ServerState) -> Arc<Self> {
        Arc::new(Self {
            state: ArcSwapOption::from_pointee(state),
            reload_lock: Mutex::new(()),
            recursion: RecursionDetector::default(),
            in_flight: AtomicU64::new(0),
            drained: Notify::new(),
        })
    }

    pub fn recursion(&self) -> &RecursionDetector {
        &self.recursion
    }

    /// Swap in a new subsystem snapshot. In-flight requests finish on the
    /// snapshot they started with.
    pub async fn reconfigure(&self, state: ServerState) -> Result<(), ForwardError> {
        let _writer = self.reload_lock.lock().await;
        if self.state.load().is_none() {
            return Err(ForwardError::ServerClosed);
        }
        // The recursion detector outlives reloads on purpose: a loop
        // started under the old state must still be broken.
        self.state.store(Some(Arc::new(state)));
        info!("server state replaced");
        Ok(())
    }

    /// Stop accepting requests, wait for in-flight ones to drain, then
    /// close the side-effect collaborators.
    pub async fn close(&self) {
        let _writer = self.reload_lock.lock().await;
        let Some(old) = self.state.swap(None) else {
            return;
        };

        loop {
            if self.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }

        old.ipset.close().await;
        info!("server closed");
    }

    /// Transport entry point: runs the pipeline over the context. On
    /// success the context carries the response (if any stage produced
    /// one); on failure the first stage error is recorded and returned.
    pub async fn handle(&self, ctx: &mut DnsContext) -> Result<(), ForwardError> {
        let _guard = InFlightGuard::enter(self);

        let Some(state) = self.state.load_full() else {
            ctx.err = Some(ForwardError::ServerClosed);
            return Err(ForwardError::ServerClosed);
        };

        // Access gate: blocked clients and refused hosts never reach the
        // pipeline and are never logged.
        let client_ip = ctx.client_ip();
        let (blocked, rule) = state.access.is_blocked_ip(client_ip);
        if blocked {
            debug!(client = %client_ip, rule = ?rule, "client blocked by access list");
            ctx.response = Some(message::refused(&ctx.request));
            ctx.skip_telemetry = true;
            return Ok(());
        }
        if let Some((host, qtype)) = ctx.question() {
            if let Some(rule) = state.access.is_blocked_host(&host, qtype) {
                debug!(%host, rule = %rule, "host refused by access list");
                ctx.response = Some(message::refused(&ctx.request));
                ctx.skip_telemetry = true;
                return Ok(());
            }
        }

        for stage in Stage::ORDER {
            match self.run_stage(&state, stage, ctx).await {
                Ok(StageFlow::Continue) => {}
                Ok(StageFlow::Finish) => break,
                Err(e) => {
                    warn!(stage = stage.name(), error = %e, "pipeline stage failed");
                    ctx.err = Some(e.clone());
                    return Err(e);
                }
            }
        }

        if let Some(response) = ctx.response.as_mut() {
            let mut header = *response.header();
            header.set_id(ctx.request.id());
            response.set_header(header);
            ctx.enable_compression = true;
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        st: &ServerState,
        stage: Stage,
        ctx: &mut DnsContext,
    ) -> StageResult {
        match stage {
            Stage::Recursion => self.process_recursion(ctx),
            Stage::Initial => self.process_initial(st, ctx),
            Stage::Ddr => self.process_ddr(st, ctx),
            Stage::DetermineLocal => self.process_determine_local(st, ctx),
            Stage::DhcpHost => self.process_dhcp_host(st, ctx).await,
            Stage::RestrictLocalPtr => self.process_restrict_local_ptr(st, ctx),
            Stage::DhcpPtr => self.process_dhcp_ptr(st, ctx).await,
            Stage::FilterBefore => self.process_filter_before(st, ctx).await,
            Stage::LocalPtr => self.process_local_ptr(st, ctx).await,
            Stage::Upstream => self.process_upstream(st, ctx).await,
            Stage::FilterAfter => self.process_filter_after(st, ctx).await,
            Stage::Ipset => self.process_ipset(st, ctx).await,
            Stage::Telemetry => self.process_telemetry(st, ctx).await,
        }
    }

    fn process_recursion(&self, ctx: &mut DnsContext) -> StageResult {
        if self.recursion.check(&ctx.request) {
            debug!("recursion detected, breaking the loop");
            ctx.response = Some(message::nxdomain(&ctx.request));
            return Ok(StageFlow::Finish);
        }
        Ok(StageFlow::Continue)
    }

    fn process_initial(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        let Some((host, qtype)) = ctx.question() else {
            return Err(ForwardError::BadRequest("empty question section".into()));
        };

        if st.config.aaaa_disabled && qtype == RecordType::AAAA {
            ctx.response = Some(message::nodata(&ctx.request));
            return Ok(StageFlow::Finish);
        }

        if host == APPLICATION_DNS_CANARY {
            ctx.response = Some(message::nxdomain(&ctx.request));
            return Ok(StageFlow::Finish);
        }
        if host == HEALTHCHECK_DOMAIN {
            ctx.response = Some(message::nodata(&ctx.request));
            return Ok(StageFlow::Finish);
        }

        if ctx.proto.supports_client_id() {
            if let Some(raw) = ctx.transport_client_id.clone() {
                let id = raw.to_ascii_lowercase();
                validators::validate_client_id(&id).map_err(ForwardError::BadRequest)?;
                ctx.client_id = Arc::from(id.as_str());
            }
        }
        // Clients without an identifier were already judged by address.
        if !ctx.client_id.is_empty() && st.access.is_blocked_client_id(&ctx.client_id) {
            debug!(client_id = %ctx.client_id, "client id blocked by access list");
            ctx.response = Some(message::refused(&ctx.request));
            ctx.skip_telemetry = true;
            return Ok(StageFlow::Finish);
        }

        ctx.protection_enabled = st.config.protection_enabled;
        if let Some(clients) = st.selector.clients() {
            let id = (!ctx.client_id.is_empty()).then(|| ctx.client_id.to_string());
            if let Some(settings) =
                clients.filtering_settings_for(id.as_deref(), ctx.client_ip())
            {
                ctx.settings = settings;
            }
        }

        ctx.response_ad =
            ctx.request.authentic_data() || message::dnssec_ok(&ctx.request);

        Ok(StageFlow::Continue)
    }

    fn process_ddr(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() {
            return Ok(StageFlow::Continue);
        }
        let Some((host, qtype)) = ctx.question() else {
            return Ok(StageFlow::Continue);
        };
        if !st.ddr.handles(&host) {
            return Ok(StageFlow::Continue);
        }
        ctx.response = Some(st.ddr.respond(&ctx.request, qtype));
        Ok(StageFlow::Finish)
    }

    fn process_determine_local(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        ctx.is_local_client = st.private_nets.contains(ctx.client_ip());
        Ok(StageFlow::Continue)
    }

    async fn process_dhcp_host(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() {
            return Ok(StageFlow::Continue);
        }
        let Some((host, qtype)) = ctx.question() else {
            return Ok(StageFlow::Continue);
        };

        if st.local_names.is_under_local_suffix(&host) && !ctx.is_local_client {
            debug!(%host, client = %ctx.client_ip(), "local name refused for external client");
            ctx.response = Some(message::nxdomain(&ctx.request));
            ctx.skip_telemetry = true;
            return Ok(StageFlow::Finish);
        }

        if let Some(lease_host) = st.local_names.dhcp_host_from_question(&host, qtype) {
            ctx.is_dhcp_host = true;
            if qtype == RecordType::A {
                if let Some(ip) = st.local_names.ip_by_host(&lease_host) {
                    if let Some(owner) = ctx.request.queries().first().map(|q| q.name().clone()) {
                        let record = message::address_record(owner, ip, LOCAL_ANSWER_TTL);
                        ctx.response =
                            Some(message::with_answers(&ctx.request, vec![record]));
                    }
                }
            }
            return Ok(StageFlow::Continue);
        }

        // Hosts-file answers for plain address questions.
        if qtype.is_address() {
            if let Some(found) = st.local_names.hosts_match(&host, qtype).await {
                let wanted_v4 = qtype == RecordType::A;
                let records: Vec<_> = found
                    .addresses
                    .iter()
                    .filter(|ip| ip.is_ipv4() == wanted_v4)
                    .filter_map(|ip| {
                        ctx.request
                            .queries()
                            .first()
                            .map(|q| message::address_record(q.name().clone(), *ip, LOCAL_ANSWER_TTL))
                    })
                    .collect();
                if !records.is_empty() {
                    ctx.response = Some(message::with_answers(&ctx.request, records));
                }
            }
        }

        Ok(StageFlow::Continue)
    }

    fn process_restrict_local_ptr(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() {
            return Ok(StageFlow::Continue);
        }
        let Some((host, qtype)) = ctx.question() else {
            return Ok(StageFlow::Continue);
        };
        if qtype != RecordType::PTR {
            return Ok(StageFlow::Continue);
        }
        // Non-ARPA PTR targets (DNS-SD service enumeration) go upstream.
        let Some(mut addr) = rdns::unreverse_addr(&host) else {
            return Ok(StageFlow::Continue);
        };

        if let (Some(dns64), IpAddr::V6(v6)) = (&st.dns64, addr) {
            if let Some(v4) = dns64.unmap(v6) {
                addr = IpAddr::V4(v4);
            }
        }

        if !st.private_nets.contains(addr) {
            return Ok(StageFlow::Continue);
        }
        if !ctx.is_local_client {
            debug!(%addr, client = %ctx.client_ip(), "private PTR refused for external client");
            ctx.response = Some(message::nxdomain(&ctx.request));
            ctx.skip_telemetry = true;
            return Ok(StageFlow::Finish);
        }

        ctx.unreversed_ip = Some(addr);
        ctx.settings = ctx.settings.clone().with_local_ptr_overrides();
        Ok(StageFlow::Continue)
    }

    async fn process_dhcp_ptr(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() {
            return Ok(StageFlow::Continue);
        }
        let Some(addr) = ctx.unreversed_ip else {
            return Ok(StageFlow::Continue);
        };
        let Some(owner) = ctx.request.queries().first().map(|q| q.name().clone()) else {
            return Ok(StageFlow::Continue);
        };

        let target = match st.local_names.host_by_ip(addr) {
            Some(fqdn) => Some(fqdn),
            None => {
                let Some((host, _)) = ctx.question() else {
                    return Ok(StageFlow::Continue);
                };
                st.local_names
                    .hosts_match(&host, RecordType::PTR)
                    .await
                    .and_then(|found| found.host)
            }
        };

        if let Some(target) = target {
            if let Some(target_name) = message::absolute_name(&target) {
                let record = message::ptr_record(owner, target_name, LOCAL_ANSWER_TTL);
                ctx.response = Some(message::with_answers(&ctx.request, vec![record]));
            }
        }
        Ok(StageFlow::Continue)
    }

    async fn process_filter_before(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() || !ctx.protection_enabled || !ctx.settings.filtering_enabled {
            return Ok(StageFlow::Continue);
        }
        st.filter_bridge.filter_request(ctx).await;
        Ok(StageFlow::Continue)
    }

    async fn process_local_ptr(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() {
            return Ok(StageFlow::Continue);
        }
        if ctx.unreversed_ip.is_none() {
            return Ok(StageFlow::Continue);
        }

        if !st.config.use_private_rdns || !st.selector.has_private_upstreams() {
            ctx.response = Some(message::nxdomain(&ctx.request));
            ctx.skip_telemetry = true;
            return Ok(StageFlow::Finish);
        }

        // Remember the outgoing question; if it comes back to us the
        // recursion stage answers it without another round trip.
        self.recursion.add(&ctx.request);

        match st
            .exchanger
            .exchange_with_deadline(st.selector.private_upstreams(), &ctx.request, ctx.deadline)
            .await
        {
            Ok(outcome) => {
                let mut response = outcome.response;
                if !ctx.response_ad {
                    response.set_authentic_data(false);
                }
                ctx.response = Some(response);
                ctx.response_from_upstream = true;
                ctx.upstream_addr = Some(outcome.upstream_addr);
                Ok(StageFlow::Continue)
            }
            Err(e) if e.is_no_upstreams() => {
                ctx.response = Some(message::nxdomain(&ctx.request));
                ctx.skip_telemetry = true;
                Ok(StageFlow::Finish)
            }
            Err(e) => Err(e),
        }
    }

    async fn process_upstream(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.has_response() {
            return Ok(StageFlow::Continue);
        }

        // A lease name that fell through filtering unanswered must not
        // leak upstream.
        if ctx.is_dhcp_host {
            ctx.response = Some(message::nxdomain(&ctx.request));
            return Ok(StageFlow::Continue);
        }

        let Some((host, qtype)) = ctx.question() else {
            return Err(ForwardError::BadRequest("empty question section".into()));
        };

        let client_id = (!ctx.client_id.is_empty()).then(|| ctx.client_id.to_string());
        let upstreams = st
            .selector
            .select(&host, client_id.as_deref(), ctx.client_ip())?;

        let mut outgoing = ctx.request.clone();
        if st.config.enable_dnssec {
            outgoing.set_authentic_data(true);
        }

        let outcome = st
            .exchanger
            .exchange_with_deadline(&upstreams, &outgoing, ctx.deadline)
            .await?;
        let mut response = outcome.response;

        if qtype == RecordType::AAAA {
            if let Some(dns64) = &st.dns64 {
                if Dns64Synthesizer::should_synthesize(&response) {
                    if let Some(synthesized) =
                        self.synthesize_dns64(st, dns64, ctx, &response, &upstreams).await
                    {
                        response = synthesized;
                    }
                }
            }
        }

        // RFC 6840 §5.8: only a caller that asked for DNSSEC data gets
        // the AD bit.
        if !ctx.response_ad {
            response.set_authentic_data(false);
        }

        ctx.response = Some(response);
        ctx.response_from_upstream = true;
        ctx.upstream_addr = Some(outcome.upstream_addr);
        Ok(StageFlow::Continue)
    }

    async fn synthesize_dns64(
        &self,
        st: &ServerState,
        dns64: &Dns64Synthesizer,
        ctx: &DnsContext,
        aaaa_response: &Message,
        upstreams: &[Arc<dyn UpstreamResolver>],
    ) -> Option<Message> {
        use hickory_proto::op::{MessageType, OpCode, Query};
        use hickory_proto::rr::RecordType as WireRecordType;

        let ttl = Dns64Synthesizer::synthesis_ttl(aaaa_response);
        let name = ctx.request.queries().first()?.name().clone();

        let mut a_request = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        a_request.set_recursion_desired(true);
        a_request.add_query(Query::query(name, WireRecordType::A));

        let a_outcome = match st.exchanger.exchange(upstreams, &a_request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(error = %e, "DNS64 A lookup failed");
                return None;
            }
        };

        let records = dns64.synthesize(&a_outcome.response, ttl);
        if records.is_empty() {
            return None;
        }
        Some(message::with_answers(&ctx.request, records))
    }

    async fn process_filter_after(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        if ctx.response.is_none() {
            return Ok(StageFlow::Continue);
        }
        if ctx.protection_enabled && ctx.settings.filtering_enabled {
            st.filter_bridge.filter_response(ctx).await;
        }
        st.filter_bridge.restore_rewrite(ctx);
        Ok(StageFlow::Continue)
    }

    async fn process_ipset(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        st.ipset.dispatch(ctx).await;
        Ok(StageFlow::Continue)
    }

    async fn process_telemetry(&self, st: &ServerState, ctx: &mut DnsContext) -> StageResult {
        st.telemetry.record(ctx).await;
        Ok(StageFlow::Continue)
    }
}

struct InFlightGuard<'a> {
    forwarder: &'a DnsForwarder,
}

impl<'a> InFlightGuard<'a> {
    fn enter(forwarder: &'a DnsForwarder) -> Self {
        forwarder.in_flight.fetch_add(1, Ordering::AcqRel);
        Self { forwarder }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.forwarder.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.forwarder.drained.notify_waiters();
        }
    }
}
