//! Hot-reload and shutdown semantics.

#[path = "../common/mod.rs"]
mod common;

use bastion_dns_domain::{AccessConfig, DnsConfig};
use bastion_dns_infrastructure::dns::server::{DnsForwarder, ServerState};
use common::{client_ctx, StaticUpstream};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

fn state_with_access(blocked: &[&str]) -> ServerState {
    let mut access = AccessConfig::default();
    access.blocked_clients = blocked.iter().map(|s| s.to_string()).collect();

    ServerState::builder(DnsConfig::default())
        .access(access)
        .default_upstreams(vec![StaticUpstream::new(
            "upstream:53",
            &[("www.example.org.", "93.184.216.34")],
        ) as _])
        .build()
        .unwrap()
}

#[tokio::test]
async fn reconfigure_swaps_the_access_lists() {
    let forwarder = DnsForwarder::new(state_with_access(&[]));

    let mut before = client_ctx("www.example.org.", RecordType::A, "192.168.0.10");
    forwarder.handle(&mut before).await.unwrap();
    assert_eq!(
        before.response.expect("response").response_code(),
        ResponseCode::NoError
    );

    forwarder
        .reconfigure(state_with_access(&["192.168.0.10"]))
        .await
        .unwrap();

    let mut after = client_ctx("www.example.org.", RecordType::A, "192.168.0.10");
    forwarder.handle(&mut after).await.unwrap();
    assert_eq!(
        after.response.expect("response").response_code(),
        ResponseCode::Refused
    );

    // Other clients are untouched.
    let mut other = client_ctx("www.example.org.", RecordType::A, "192.168.0.11");
    forwarder.handle(&mut other).await.unwrap();
    assert_eq!(
        other.response.expect("response").response_code(),
        ResponseCode::NoError
    );
}

#[tokio::test]
async fn close_rejects_new_requests_and_reconfigure() {
    let forwarder = DnsForwarder::new(state_with_access(&[]));
    forwarder.close().await;

    let mut ctx = client_ctx("www.example.org.", RecordType::A, "192.168.0.10");
    assert!(forwarder.handle(&mut ctx).await.unwrap_err().is_server_closed());
    assert!(forwarder
        .reconfigure(state_with_access(&[]))
        .await
        .unwrap_err()
        .is_server_closed());

    // Closing twice is fine.
    forwarder.close().await;
}
