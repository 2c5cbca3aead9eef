use bastion_dns_infrastructure::dns::handler::ForwarderHandler;
use bastion_dns_infrastructure::dns::server::DnsForwarder;
use hickory_server::ServerFuture;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{info, warn};

/// Kernel-side datagram buffers. A resolver front-end absorbs query
/// bursts much faster than it answers them, so the receive side gets
/// room for roughly a thousand full EDNS datagrams; the send side needs
/// less since responses drain as they are produced.
const UDP_RECV_BUFFER: usize = 4 << 20;
const UDP_SEND_BUFFER: usize = 2 << 20;

/// Idle cutoff for DNS-over-TCP connections.
const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(8);

pub async fn start_dns_server(
    bind_addr: String,
    forwarder: Arc<DnsForwarder>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr.parse()?;

    let udp_socket = bound_udp_socket(addr)?;
    let tcp_listener = TcpListener::bind(addr).await?;

    info!(%addr, "DNS listeners bound");

    let mut server = ServerFuture::new(ForwarderHandler::new(forwarder));
    server.register_socket(udp_socket);
    server.register_listener(tcp_listener, TCP_IDLE_TIMEOUT);
    server.block_until_done().await?;
    Ok(())
}

/// Bind the UDP listener through socket2 so the kernel buffers are
/// widened before the first datagram arrives. Buffer tuning is best
/// effort: some systems cap SO_RCVBUF below what we ask for, and a
/// smaller buffer is not worth refusing to start over.
fn bound_udp_socket(addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if let Err(e) = socket.set_recv_buffer_size(UDP_RECV_BUFFER) {
        warn!(error = %e, "could not widen UDP receive buffer");
    }
    if let Err(e) = socket.set_send_buffer_size(UDP_SEND_BUFFER) {
        warn!(error = %e, "could not widen UDP send buffer");
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}
