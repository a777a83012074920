//! Error types for graft
//!
//! This module defines every error the load pipeline and the database resolver
//! can surface. Uses `thiserror` for ergonomic `Display` and `Error`
//! implementations.
//!
//! Two variants are warnings rather than failures: [`GraftError::ProvisionFailed`]
//! and [`GraftError::Isolation`]. The pipeline logs them and keeps going; see
//! [`GraftError::is_fatal`].

use thiserror::Error;

/// The primary error type for graft operations.
#[derive(Error, Debug)]
pub enum GraftError {
    /// The requested service is not in the compiled-in catalog.
    #[error("service {name:?} not found, allowed services are: {}", .available.join(", "))]
    ServiceNotFound {
        name: String,
        available: Vec<String>,
    },

    /// Source retrieval (clone, ref fetch, checkout) exited non-zero.
    #[error("fetch failed: `{command}` exited with {status}\n{output}")]
    FetchFailed {
        command: String,
        status: String,
        output: String,
    },

    /// The package manager install failed. Non-fatal.
    #[error("dependency install failed in {dir}: {output}")]
    ProvisionFailed { dir: String, output: String },

    /// A single dependency could not be isolated. Non-fatal.
    #[error("could not isolate '{name}': {reason}")]
    Isolation { name: String, reason: String },

    /// Loading the service's entry points failed. The host may be partially
    /// mutated at this point.
    #[error("loading {stage} failed: {cause}")]
    LoadFailed { stage: String, cause: String },

    /// Merged connection spec lacks required keys.
    #[error("database config invalid, missing required keys: {}", .missing.join(", "))]
    ConfigInvalid { missing: Vec<String> },

    /// Every host candidate failed its connect + round trip.
    #[error(
        "could not connect to any database host (tried: {}); last error: {last_error}{}",
        .hosts.join(", "),
        .hint.as_deref().map(|h| format!("\nhint: {}", h)).unwrap_or_default()
    )]
    AllCandidatesFailed {
        hosts: Vec<String>,
        last_error: String,
        hint: Option<String>,
    },

    /// Connection-level failure for one candidate.
    #[error("Database error: {0}")]
    Database(String),

    /// A subprocess could not be spawned at all.
    #[error("Process error: {0}")]
    Process(String),

    /// Configuration-related errors (invalid config file, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse errors (service database.yml)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GraftError {
    /// Returns `false` for the two best-effort steps (provisioning and
    /// per-dependency isolation); everything else aborts a load.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            GraftError::ProvisionFailed { .. } | GraftError::Isolation { .. }
        )
    }
}

/// A specialized `Result` type for graft operations.
pub type Result<T> = std::result::Result<T, GraftError>;
