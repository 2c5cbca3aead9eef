use anyhow::Context;
use bastion_dns_domain::Config;
use std::path::Path;
use tracing::warn;

/// Load the TOML config, falling back to defaults when no file is given
/// or the default path does not exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = Path::new("bastion-dns.toml");
            if !default.exists() {
                warn!("no configuration file, using defaults");
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = Config::from_toml(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
