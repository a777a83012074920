//! Host candidate preview.

use anyhow::{Context, Result};

use graft::config::Config;
use graft::database::HostConvention;

/// Print the candidates `host` expands to, in attempt order.
pub(crate) fn cmd_hosts(host: String, adapter: Option<String>) -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let convention = HostConvention::from(&config.database.convention);

    let candidates = convention.expand(&host);
    if candidates.is_empty() {
        anyhow::bail!("host must not be empty");
    }

    let port = adapter.as_deref().and_then(|a| {
        config
            .database
            .default_ports
            .get(&graft::database::normalize_key(a))
            .copied()
    });
    for candidate in candidates {
        println!("{}", render_candidate(&candidate, port));
    }
    Ok(())
}

/// `host:port` for plain hosts; URLs carry their own port and print as-is.
fn render_candidate(candidate: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if !candidate.contains("://") => {
            if candidate.contains(':') {
                format!("[{}]:{}", candidate.trim_start_matches('[').trim_end_matches(']'), port)
            } else {
                format!("{}:{}", candidate, port)
            }
        }
        _ => candidate.to_string(),
    }
}
