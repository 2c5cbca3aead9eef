use bastion_dns_domain::Config;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// The configured level is the baseline; `RUST_LOG` overrides it when
/// set, so a one-off debug run needs no config edit. Directives that
/// fail to parse fall back to `info`.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    tracing::debug!(level = %config.logging.level, "tracing subscriber installed");
}
