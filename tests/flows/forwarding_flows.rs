//! Full forwarding flows through the public server API.

#[path = "../common/mod.rs"]
mod common;

use bastion_dns_domain::config::DomainUpstreams;
use bastion_dns_domain::DnsConfig;
use bastion_dns_infrastructure::dns::server::{DnsForwarder, ServerState};
use common::{client_ctx, StaticUpstream};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{RData, RecordType};
use std::sync::Arc;

#[tokio::test]
async fn resolves_through_the_default_upstream() {
    let upstream = StaticUpstream::new("upstream:53", &[("www.example.org.", "93.184.216.34")]);
    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![upstream as _])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = client_ctx("www.example.org.", RecordType::A, "192.168.0.10");
    forwarder.handle(&mut ctx).await.unwrap();

    let response = ctx.response.expect("response");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(response.id(), 77);
    match response.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0.to_string(), "93.184.216.34"),
        other => panic!("unexpected rdata: {other:?}"),
    }
    assert_eq!(ctx.upstream_addr.as_deref(), Some("upstream:53"));
    assert!(ctx.response_from_upstream);
}

#[tokio::test]
async fn domain_override_routes_past_the_default() {
    let default_upstream = StaticUpstream::new("default:53", &[]);
    let lan_upstream = StaticUpstream::new("router:53", &[("nas.home.", "192.168.1.20")]);

    let mut state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![default_upstream as _])
        .build()
        .unwrap();
    state.selector = state.selector.with_override(
        DomainUpstreams {
            domain: "home".to_string(),
            upstreams: vec!["router:53".to_string()],
        },
        Some(vec![lan_upstream as _]),
    );

    let forwarder = DnsForwarder::new(state);

    let mut ctx = client_ctx("nas.home.", RecordType::A, "192.168.0.10");
    forwarder.handle(&mut ctx).await.unwrap();

    let response = ctx.response.expect("response");
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(ctx.upstream_addr.as_deref(), Some("router:53"));
}

#[tokio::test]
async fn upstream_miss_is_nxdomain() {
    let upstream = StaticUpstream::new("upstream:53", &[]);
    let state = ServerState::builder(DnsConfig::default())
        .default_upstreams(vec![upstream as _])
        .build()
        .unwrap();
    let forwarder = DnsForwarder::new(state);

    let mut ctx = client_ctx("missing.example.org.", RecordType::A, "192.168.0.10");
    forwarder.handle(&mut ctx).await.unwrap();
    assert_eq!(
        ctx.response.expect("response").response_code(),
        ResponseCode::NXDomain
    );
}
