//! Configuration management for graft
//!
//! Configuration is loaded from `~/.graft/config.json` with environment
//! variable overrides. The service catalog itself is compiled in and is not
//! part of the configuration.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{GraftError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the graft configuration directory path (~/.graft)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".graft")
    }

    /// Returns the path to the config file (~/.graft/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                Config::default()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| GraftError::Config(format!("{}: {}", path.display(), e)))?
            }
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Variables follow the pattern `GRAFT_SECTION_KEY`.
    fn apply_env_overrides(&mut self) {
        // Workspace
        if let Ok(val) = std::env::var("GRAFT_WORKSPACE_BASE_DIR") {
            if !val.trim().is_empty() {
                self.workspace.base_dir = Some(PathBuf::from(val));
            }
        }

        // Provisioning
        if let Ok(val) = std::env::var("GRAFT_PROVISION_PROGRAM") {
            self.provision.program = val;
        }
        if let Ok(val) = std::env::var("GRAFT_PROVISION_MANIFEST") {
            self.provision.manifest = val;
        }

        // Isolation
        if let Ok(val) = std::env::var("GRAFT_ISOLATION_COMMON") {
            self.isolation.common = split_list(&val);
        }

        // Database convention
        if let Ok(val) = std::env::var("GRAFT_DATABASE_CANONICAL_PREFIX") {
            self.database.convention.canonical_prefix = val;
        }
        if let Ok(val) = std::env::var("GRAFT_DATABASE_FRIENDLY_PREFIX") {
            self.database.convention.friendly_prefix = val;
        }
        if let Ok(val) = std::env::var("GRAFT_DATABASE_DIRECT_DOMAIN") {
            self.database.convention.direct_domain = val;
        }
        if let Ok(val) = std::env::var("GRAFT_DATABASE_TUNNEL_DOMAIN") {
            self.database.convention.tunnel_domain = val;
        }

        // Logging
        if let Ok(val) = std::env::var("GRAFT_LOGGING_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("GRAFT_LOGGING_FORMAT") {
            match val.to_ascii_lowercase().as_str() {
                "pretty" => self.logging.format = LogFormat::Pretty,
                "component" => self.logging.format = LogFormat::Component,
                "json" => self.logging.format = LogFormat::Json,
                _ => {}
            }
        }
    }

    /// Directory new workspaces are created under.
    pub fn workspace_base(&self) -> PathBuf {
        self.workspace
            .base_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
