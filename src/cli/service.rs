//! Service listing and load command handlers.

use anyhow::{Context, Result};

use graft::config::Config;
use graft::database::ConnectionSpec;
use graft::loader::ServiceManager;
use graft::registry::list_services;

/// Print the loadable services, one per line.
pub(crate) fn cmd_services() {
    for name in list_services() {
        println!("{}", name);
    }
}

/// Load a service and optionally connect it to its database.
pub(crate) async fn cmd_load(
    service: String,
    reference: Option<String>,
    db: Vec<String>,
    json: bool,
) -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let override_spec = ConnectionSpec::from_pairs(&db).context("Invalid --db override")?;

    let mut manager = ServiceManager::with_defaults(config);
    let handle = manager
        .load(&service, reference.as_deref())
        .await
        .with_context(|| format!("Failed to load service '{}'", service))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&handle)?);
    } else {
        println!("{}", handle.summary());
        for warning in &handle.warnings {
            println!("  warning: {}", warning);
        }
    }

    if !db.is_empty() {
        let active = manager
            .configure_database(&override_spec)
            .await
            .context("Failed to configure database")?;
        println!("Connected to database at {}", active.host());
        manager.disconnect().await?;
    }

    Ok(())
}
