//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod database;
pub mod service;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "graft")]
#[command(version)]
#[command(about = "Load remote services into a running host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List loadable services
    Services,
    /// Fetch, provision and load a service
    Load {
        /// Service name (see `graft services`)
        service: String,
        /// Git ref to check out instead of the default branch
        #[arg(long = "ref", value_name = "REF")]
        reference: Option<String>,
        /// Database override as key=value, repeatable (e.g. --db host=noki-7)
        #[arg(long = "db", value_name = "KEY=VALUE")]
        db: Vec<String>,
        /// Print the load result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the database host candidates derived from a host name
    Hosts {
        /// Host name, bare label, IP literal or URL
        host: String,
        /// Adapter used to pick the default port
        #[arg(long)]
        adapter: Option<String>,
    },
    /// Validate configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check configuration for errors and warnings
    Check,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load config early so logging respects it; fall back to defaults if the
    // config file is unreadable. Commands that need the config reload it and
    // report the error properly.
    let logging_cfg = graft::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    graft::utils::logging::init_logging(&logging_cfg)?;

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Services) => {
            service::cmd_services();
        }
        Some(Commands::Load {
            service,
            reference,
            db,
            json,
        }) => {
            service::cmd_load(service, reference, db, json).await?;
        }
        Some(Commands::Hosts { host, adapter }) => {
            database::cmd_hosts(host, adapter)?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("graft {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_load() {
        let cli = Cli::try_parse_from([
            "graft",
            "load",
            "catalog",
            "--ref",
            "release-42",
            "--db",
            "host=noki-7",
            "--db",
            "database=app",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Load {
                service,
                reference,
                db,
                json,
            }) => {
                assert_eq!(service, "catalog");
                assert_eq!(reference.as_deref(), Some("release-42"));
                assert_eq!(db, vec!["host=noki-7", "database=app"]);
                assert!(!json);
            }
            _ => panic!("expected load command"),
        }
    }

    #[test]
    fn test_cli_parses_hosts() {
        let cli = Cli::try_parse_from(["graft", "hosts", "noki-7", "--adapter", "postgres"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Hosts { ref host, adapter: Some(_) }) if host == "noki-7"
        ));
    }

    #[test]
    fn test_cli_requires_service_for_load() {
        assert!(Cli::try_parse_from(["graft", "load"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
