//! End-to-end pipeline flows over mock collaborators.

mod helpers;

use bastion_dns_application::ports::StatsResult;
use bastion_dns_domain::{DdrConfig, DnsConfig, DnsProto, FilterReason};
use bastion_dns_infrastructure::dns::context::DnsContext;
use bastion_dns_infrastructure::dns::server::{DnsForwarder, ServerState};
use helpers::mocks::{
    self, MockClients, MockDhcp, MockFilterEngine, MockQueryLog, MockStats, MockUpstream,
};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::svcb::{Alpn, SvcParamKey, SvcParamValue};
use hickory_proto::rr::{RData, RecordType as WireRecordType};
use std::net::Ipv6Addr;
use std::sync::Arc;

const LOCAL_CLIENT: &str = "192.168.0.5";
const EXTERNAL_CLIENT: &str = "254.253.252.251";

fn ctx(host: &str, qtype: WireRecordType, client: &str) -> DnsContext {
    DnsContext::new(
        mocks::query(4321, host, qtype),
        format!("{client}:53124").parse().unwrap(),
        DnsProto::Udp,
    )
}

fn ddr_config(has_ip_addrs: bool) -> DnsConfig {
    let mut config = DnsConfig::default();
    config.server_name = "dns.example.net".to_string();
    config.ddr = DdrConfig {
        https_port: Some(8044),
        tls_port: Some(8043),
        quic_port: Some(8042),
        has_ip_addrs,
        doh_path: "/dns-query{?dns}".to_string(),
    };
    config
}

fn alpns(response: &hickory_proto::op::Message) -> Vec<String> {
    response
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::SVCB(svcb) => svcb.svc_params().iter().find_map(|(k, v)| {
                if *k == SvcParamKey::Alpn {
                    match v {
                        SvcParamValue::Alpn(Alpn(list)) => Some(list[0].clone()),
                        _ => None,
                    }
                } else {
                    None
                }
            }),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn ddr_advertises_configured_endpoints() {
    let state = ServerState::builder(ddr_config(true))
        .default_upstreams(vec![])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("_dns.resolver.arpa.", WireRecordType::SVCB, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();

    let response = ctx.response.expect("DDR response");
    assert_eq!(response.answers().len(), 3);
    assert_eq!(alpns(&response), vec!["h2", "dot", "doq"]);
    for record in response.answers() {
        match record.data() {
            RData::SVCB(svcb) => {
                assert_eq!(svcb.svc_priority(), 1);
                assert_eq!(svcb.target_name().to_ascii(), "dns.example.net.");
            }
            other => panic!("unexpected rdata: {other:?}"),
        }
    }
}

#[tokio::test]
async fn ddr_without_encrypted_endpoints_is_nodata() {
    let mut config = DnsConfig::default();
    config.server_name = "dns.example.net".to_string();
    let state = ServerState::builder(config)
        .default_upstreams(vec![])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("_dns.resolver.arpa.", WireRecordType::SVCB, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();

    let response = ctx.response.expect("DDR response");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
}

#[tokio::test]
async fn dhcp_host_answered_for_local_refused_for_external() {
    let upstream = MockUpstream::new("upstream:53");
    let query_log = MockQueryLog::new();

    let state = ServerState::builder(DnsConfig::default())
        .dhcp(MockDhcp::with_leases(&[("example", "1.2.3.4")]))
        .default_upstreams(vec![Arc::clone(&upstream) as _])
        .query_log(Arc::clone(&query_log) as _)
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    // Local client gets the lease address.
    let mut local = ctx("example.lan.", WireRecordType::A, LOCAL_CLIENT);
    forwarder.handle(&mut local).await.unwrap();
    let response = local.response.expect("local answer");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    match response.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0, "1.2.3.4".parse::<std::net::Ipv4Addr>().unwrap()),
        other => panic!("unexpected rdata: {other:?}"),
    }

    // External client gets NXDOMAIN, unlogged, and nothing leaks upstream.
    let mut external = ctx("example.lan.", WireRecordType::A, EXTERNAL_CLIENT);
    forwarder.handle(&mut external).await.unwrap();
    let response = external.response.expect("external answer");
    assert_eq!(response.response_code(), ResponseCode::NXDomain);

    assert_eq!(upstream.exchange_count(), 0);
    // Only the local query reaches the log.
    assert_eq!(query_log.logged_hosts(), vec!["example.lan"]);
}

#[tokio::test]
async fn private_ptr_restricted_to_local_clients() {
    let private = MockUpstream::new("router:53");
    private.respond(
        "1.1.168.192.in-addr.arpa.",
        WireRecordType::PTR,
        mocks::answer(vec![mocks::ptr_record(
            "1.1.168.192.in-addr.arpa.",
            "some.local.",
            60,
        )]),
    );
    let query_log = MockQueryLog::new();

    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![])
        .private_upstreams(vec![Arc::clone(&private) as _])
        .query_log(Arc::clone(&query_log) as _)
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    // External client: NXDOMAIN, no log entry.
    let mut external = ctx(
        "1.1.168.192.in-addr.arpa.",
        WireRecordType::PTR,
        EXTERNAL_CLIENT,
    );
    forwarder.handle(&mut external).await.unwrap();
    assert_eq!(
        external.response.expect("response").response_code(),
        ResponseCode::NXDomain
    );
    assert!(query_log.logged_hosts().is_empty());
    assert_eq!(private.exchange_count(), 0);

    // Local client: forwarded to the private resolver.
    let mut local = ctx(
        "1.1.168.192.in-addr.arpa.",
        WireRecordType::PTR,
        "192.168.1.2",
    );
    forwarder.handle(&mut local).await.unwrap();
    let response = local.response.expect("response");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    match response.answers()[0].data() {
        RData::PTR(ptr) => assert_eq!(ptr.0.to_ascii(), "some.local."),
        other => panic!("unexpected rdata: {other:?}"),
    }
    assert_eq!(private.exchange_count(), 1);
    assert_eq!(query_log.logged_hosts(), vec!["1.1.168.192.in-addr.arpa"]);
}

#[tokio::test]
async fn cname_chain_blocking_rewrites_the_answer() {
    let upstream = MockUpstream::new("upstream:53");
    upstream.respond(
        "badhost.",
        WireRecordType::A,
        mocks::answer(vec![
            mocks::cname_record("badhost.", "null.example.org.", 60),
            mocks::a_record("null.example.org.", "1.2.3.4", 60),
        ]),
    );
    let query_log = MockQueryLog::new();
    let stats = MockStats::new();

    let state = ServerState::builder(DnsConfig::default())
        .filter_engine(MockFilterEngine::blocking(&["null.example.org"]))
        .default_upstreams(vec![Arc::clone(&upstream) as _])
        .query_log(Arc::clone(&query_log) as _)
        .stats(Arc::clone(&stats) as _)
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("badhost.", WireRecordType::A, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();

    // Default blocking mode: NXDOMAIN replaces the upstream answer.
    let response = ctx.response.expect("blocked response");
    assert_eq!(response.response_code(), ResponseCode::NXDomain);
    assert!(ctx.orig_response.is_some(), "unfiltered answer kept");

    let records = query_log.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].orig_answer.is_some());
    assert_eq!(
        records[0].filter_result.as_ref().map(|r| r.reason),
        Some(FilterReason::FilteredBlockList)
    );

    let entries = stats.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].domain.as_ref(), "badhost");
    assert_eq!(entries[0].result, StatsResult::Filtered);
}

#[tokio::test]
async fn client_id_selects_custom_upstreams() {
    let default_upstream = MockUpstream::new("default:53");
    let client_upstream = MockUpstream::new("client:53");
    client_upstream.respond(
        "example.org.",
        WireRecordType::A,
        mocks::answer(vec![mocks::a_record("example.org.", "10.1.2.3", 60)]),
    );

    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![Arc::clone(&default_upstream) as _])
        .clients(Arc::new(MockClients {
            client_id: "laptop".to_string(),
            upstreams: vec![Arc::clone(&client_upstream) as _],
        }))
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = DnsContext::new(
        mocks::query(8, "example.org.", WireRecordType::A),
        "192.168.0.9:40443".parse().unwrap(),
        DnsProto::Tls,
    )
    .with_client_id("laptop");
    forwarder.handle(&mut ctx).await.unwrap();

    assert_eq!(ctx.upstream_addr.as_deref(), Some("client:53"));
    assert_eq!(default_upstream.exchange_count(), 0);
    assert_eq!(client_upstream.exchange_count(), 1);
}

async fn dns64_case(soa_ttl: u32, expected_ttl: u32) {
    let upstream = MockUpstream::new("upstream:53");
    upstream.respond(
        "ipv4.only.",
        WireRecordType::AAAA,
        mocks::nodata_with_soa("only.", soa_ttl),
    );
    upstream.respond(
        "ipv4.only.",
        WireRecordType::A,
        mocks::answer(vec![mocks::a_record("ipv4.only.", "1.2.3.4", 300)]),
    );

    let mut config = DnsConfig::default();
    config.use_dns64 = true;
    let state = ServerState::builder(config)
        .default_upstreams(vec![Arc::clone(&upstream) as _])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("ipv4.only.", WireRecordType::AAAA, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();

    let response = ctx.response.expect("synthesized response");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    let answers = response.answers();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].ttl(), expected_ttl);
    match answers[0].data() {
        RData::AAAA(aaaa) => {
            assert_eq!(aaaa.0, "64:ff9b::102:304".parse::<Ipv6Addr>().unwrap())
        }
        other => panic!("unexpected rdata: {other:?}"),
    }
}

#[tokio::test]
async fn dns64_synthesis_caps_ttl_at_600() {
    dns64_case(650, 600).await;
}

#[tokio::test]
async fn dns64_synthesis_keeps_small_soa_ttl() {
    dns64_case(200, 200).await;
}

#[tokio::test]
async fn recursion_break_answers_second_query_locally() {
    let private = MockUpstream::new("router:53");
    private.respond(
        "1.1.168.192.in-addr.arpa.",
        WireRecordType::PTR,
        mocks::answer(vec![mocks::ptr_record(
            "1.1.168.192.in-addr.arpa.",
            "some.local.",
            60,
        )]),
    );

    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![])
        .private_upstreams(vec![Arc::clone(&private) as _])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut first = ctx(
        "1.1.168.192.in-addr.arpa.",
        WireRecordType::PTR,
        "192.168.1.2",
    );
    forwarder.handle(&mut first).await.unwrap();
    assert_eq!(private.exchange_count(), 1);

    // Identical question within the detector TTL: answered NXDOMAIN
    // without another forward.
    let mut second = ctx(
        "1.1.168.192.in-addr.arpa.",
        WireRecordType::PTR,
        "192.168.1.2",
    );
    forwarder.handle(&mut second).await.unwrap();
    assert_eq!(
        second.response.expect("response").response_code(),
        ResponseCode::NXDomain
    );
    assert_eq!(private.exchange_count(), 1);
}

#[tokio::test]
async fn repeated_request_yields_equal_answers() {
    let upstream = MockUpstream::new("upstream:53");
    upstream.respond(
        "stable.example.org.",
        WireRecordType::A,
        mocks::answer(vec![mocks::a_record("stable.example.org.", "5.6.7.8", 300)]),
    );

    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![Arc::clone(&upstream) as _])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut first = ctx("stable.example.org.", WireRecordType::A, LOCAL_CLIENT);
    forwarder.handle(&mut first).await.unwrap();
    let mut second = ctx("stable.example.org.", WireRecordType::A, LOCAL_CLIENT);
    forwarder.handle(&mut second).await.unwrap();

    let first = first.response.unwrap();
    let second = second.response.unwrap();
    assert_eq!(first.response_code(), second.response_code());
    assert_eq!(first.answers(), second.answers());
}

#[tokio::test]
async fn aaaa_disabled_yields_empty_answer() {
    let upstream = MockUpstream::new("upstream:53");
    let mut config = DnsConfig::default();
    config.aaaa_disabled = true;

    let state = ServerState::builder(config)
        .default_upstreams(vec![Arc::clone(&upstream) as _])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("example.org.", WireRecordType::AAAA, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();

    let response = ctx.response.expect("response");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
    assert_eq!(upstream.exchange_count(), 0);
}

#[tokio::test]
async fn application_dns_canary_is_nxdomain() {
    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("use-application-dns.net.", WireRecordType::A, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();
    assert_eq!(
        ctx.response.expect("response").response_code(),
        ResponseCode::NXDomain
    );
}

#[tokio::test]
async fn blocked_client_is_refused_without_telemetry() {
    let query_log = MockQueryLog::new();
    let mut access = bastion_dns_domain::AccessConfig::default();
    access.blocked_clients = vec!["192.168.0.5".to_string()];

    let state = ServerState::builder(DnsConfig::default())
        .access(access)
        .default_upstreams(vec![])
        .query_log(Arc::clone(&query_log) as _)
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = ctx("example.org.", WireRecordType::A, LOCAL_CLIENT);
    forwarder.handle(&mut ctx).await.unwrap();

    assert_eq!(
        ctx.response.expect("response").response_code(),
        ResponseCode::Refused
    );
    assert!(query_log.logged_hosts().is_empty());
}

#[tokio::test]
async fn closed_server_returns_server_closed() {
    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);
    forwarder.close().await;

    let mut ctx = ctx("example.org.", WireRecordType::A, LOCAL_CLIENT);
    let err = forwarder.handle(&mut ctx).await.unwrap_err();
    assert!(err.is_server_closed());
}
