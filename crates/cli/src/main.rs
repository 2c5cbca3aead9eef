//! # Bastion DNS
//!
//! Main entry point for the filtering DNS forwarder.

mod bootstrap;
mod server;

use bastion_dns_infrastructure::dns::server::{DnsForwarder, ServerState};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "bastion-dns")]
#[command(about = "A filtering DNS forwarder")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// DNS server port (overrides config)
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(short = 'b', long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = bootstrap::load_config(cli.config.as_deref())?;
    if let Some(port) = cli.dns_port {
        config.server.dns_port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    bootstrap::init_logging(&config);

    let state = ServerState::builder(config.dns.clone())
        .access(config.access.clone())
        .build()?;
    let forwarder = DnsForwarder::new(state);

    let bind_addr = format!("{}:{}", config.server.bind_address, config.server.dns_port);
    let serve = tokio::spawn(server::dns::start_dns_server(
        bind_addr,
        Arc::clone(&forwarder),
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    serve.abort();
    forwarder.close().await;

    Ok(())
}
