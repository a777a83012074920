//! Process environment a loaded service expects.

use std::path::PathBuf;
use tracing::info;

use crate::config::EnvironmentConfig;

/// Effective runtime environment and platform for one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEnvironment {
    pub environment: String,
    pub platform: String,
}

/// Set the environment selector and platform variables when unset and
/// return the effective values. Existing values are never replaced.
pub fn apply(config: &EnvironmentConfig) -> LoadEnvironment {
    let environment = set_default(&config.env_var, &config.default_env);
    info!("using {}={}", config.env_var, environment);
    let platform = set_default(&config.platform_var, &config.default_platform);
    info!("using {}={}", config.platform_var, platform);
    LoadEnvironment {
        environment,
        platform,
    }
}

/// Local source override, when the variable is set to a non-empty value.
pub fn local_source(config: &EnvironmentConfig) -> Option<PathBuf> {
    std::env::var_os(&config.local_path_var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn set_default(var: &str, default: &str) -> String {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            std::env::set_var(var, default);
            default.to_string()
        }
    }
}
