//! Configuration type definitions for graft
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so an empty or missing config file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration struct for graft
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where disposable workspaces are created
    pub workspace: WorkspaceConfig,
    /// Names and defaults of the environment variables the loader reads/sets
    pub environment: EnvironmentConfig,
    /// Package manager invocation for the service's dependencies
    pub provision: ProvisionConfig,
    /// Host-side dependency isolation
    pub isolation: IsolationConfig,
    /// Well-known file locations inside a fetched service
    pub layout: LayoutConfig,
    /// Database host convention and adapter defaults
    pub database: DatabaseConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Workspace
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for workspaces. `None` uses the system temp dir.
    pub base_dir: Option<PathBuf>,
    /// Directory name prefix for each workspace.
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            prefix: "graft-".to_string(),
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Runtime-environment selector variable read by the loaded service.
    pub env_var: String,
    /// Value assigned to `env_var` when it is unset.
    pub default_env: String,
    /// Platform identifier variable.
    pub platform_var: String,
    /// Value assigned to `platform_var` when it is unset.
    pub default_platform: String,
    /// Variable holding a local source path that bypasses git entirely.
    pub local_path_var: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            env_var: "RAILS_ENV".to_string(),
            default_env: "development".to_string(),
            platform_var: "GRAFT_PLATFORM".to_string(),
            default_platform: "primary".to_string(),
            local_path_var: "GRAFT_LOCAL_PATH".to_string(),
        }
    }
}

// ============================================================================
// Provisioning
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Package manager executable.
    pub program: String,
    /// Arguments for the install invocation.
    pub args: Vec<String>,
    /// Dependency manifest at the service root.
    pub manifest: String,
    /// Variable pointing the manager at the scoped install directory.
    pub install_root_env: String,
    /// Variable pointing the manager at the manifest.
    pub manifest_env: String,
    /// Host variables with these prefixes are stripped from the child
    /// environment ("unbundled").
    pub strip_env_prefixes: Vec<String>,
    /// Exact host variables stripped from the child environment.
    pub strip_env: Vec<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            program: "bundle".to_string(),
            args: vec!["install".to_string()],
            manifest: "Gemfile".to_string(),
            install_root_env: "BUNDLE_PATH".to_string(),
            manifest_env: "BUNDLE_GEMFILE".to_string(),
            strip_env_prefixes: vec!["BUNDLE_".to_string(), "BUNDLER_".to_string()],
            strip_env: vec!["RUBYOPT".to_string(), "RUBYLIB".to_string()],
        }
    }
}

// ============================================================================
// Isolation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Low-level libraries shared by host and guest, isolated before
    /// provisioning.
    pub common: Vec<String>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            common: crate::registry::DEFAULT_ISOLATED
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Service layout
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Low-level boot entry, relative to the service root.
    pub boot: PathBuf,
    /// Application definition entry, relative to the service root.
    pub application: PathBuf,
    /// Per-environment database declarations, relative to the service root.
    pub database: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            boot: PathBuf::from("config/boot"),
            application: PathBuf::from("config/application"),
            database: PathBuf::from("config/database.yml"),
        }
    }
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Host naming convention used to derive candidates.
    pub convention: HostConventionConfig,
    /// Standard port per adapter name.
    pub default_ports: BTreeMap<String, u16>,
    /// Statement used as the liveness round trip.
    pub probe_query: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let default_ports = [
            ("postgres", 5432),
            ("postgresql", 5432),
            ("postgis", 5432),
            ("mysql", 3306),
            ("mysql2", 3306),
            ("trilogy", 3306),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            convention: HostConventionConfig::default(),
            default_ports,
            probe_query: "SELECT 1".to_string(),
        }
    }
}

/// `<prefix>.<env-id>.<domain>` where prefix is canonical or friendly and
/// domain is direct or tunnel-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConventionConfig {
    pub canonical_prefix: String,
    pub friendly_prefix: String,
    pub direct_domain: String,
    pub tunnel_domain: String,
}

impl Default for HostConventionConfig {
    fn default() -> Self {
        Self {
            canonical_prefix: "db".to_string(),
            friendly_prefix: "my".to_string(),
            direct_domain: "example.com".to_string(),
            tunnel_domain: "dyn.example.com".to_string(),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Optional file to append JSON lines to.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}
