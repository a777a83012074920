//! Service load pipeline.
//!
//! fetch → environment → isolate (common) → provision → isolate (service)
//! → pre-load hook → boot → application → finish loading. Each stage reports
//! a [`StageOutcome`]; the driver continues on warnings and stops on the first
//! fatal outcome. The workspace is torn down whichever way the load ends.

mod application;
pub mod environment;
mod manager;

pub use application::ApplicationLoader;
pub use environment::LoadEnvironment;
pub use manager::ServiceManager;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, warn};

use crate::database::ConnectionSpec;
use crate::error::{GraftError, Result};

/// How one pipeline stage ended.
#[derive(Debug)]
pub enum StageOutcome {
    Ok,
    Warning(GraftError),
    Fatal(GraftError),
}

impl StageOutcome {
    /// Classify a stage result by [`GraftError::is_fatal`].
    pub fn from_result<T>(result: Result<T>) -> Self {
        match result {
            Ok(_) => StageOutcome::Ok,
            Err(e) if e.is_fatal() => StageOutcome::Fatal(e),
            Err(e) => StageOutcome::Warning(e),
        }
    }
}

/// Logs stage outcomes and collects warnings for one load.
#[derive(Debug)]
pub struct StageDriver {
    service: String,
    warnings: Vec<GraftError>,
}

impl StageDriver {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            warnings: Vec::new(),
        }
    }

    /// Log the start of a blocking stage.
    pub fn begin(&self, stage: &str) {
        crate::log_component!(info, "loader", "stage started", service = self.service.as_str(), stage = stage);
    }

    /// Record `outcome`; `Err` only for a fatal outcome.
    pub fn finish(&mut self, stage: &str, outcome: StageOutcome) -> Result<()> {
        match outcome {
            StageOutcome::Ok => {
                crate::log_component!(info, "loader", "stage finished", service = self.service.as_str(), stage = stage);
                Ok(())
            }
            StageOutcome::Warning(w) => {
                warn!(component = "loader", service = %self.service, stage, "stage finished with warning: {}", w);
                self.warnings.push(w);
                Ok(())
            }
            StageOutcome::Fatal(e) => Err(self.fail(stage, e)),
        }
    }

    /// Record a stage that produces a value later stages need. Any error is
    /// fatal here.
    pub fn require<T>(&mut self, stage: &str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.finish(stage, StageOutcome::Ok)?;
                Ok(value)
            }
            Err(e) => Err(self.fail(stage, e)),
        }
    }

    fn fail(&self, stage: &str, e: GraftError) -> GraftError {
        error!(component = "loader", service = %self.service, stage, "stage failed: {}", e);
        e
    }

    pub fn warnings(&self) -> &[GraftError] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<GraftError> {
        self.warnings
    }
}

/// A service that is now part of the host process.
///
/// There is no unload; `root` may already be gone since the workspace is
/// removed once loading finishes.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedServiceHandle {
    pub service: String,
    pub root: PathBuf,
    pub reference: Option<String>,
    pub environment: String,
    pub platform: String,
    /// The service's own database spec for `environment`, read during load.
    /// Serialized with secrets masked.
    #[serde(serialize_with = "serialize_redacted")]
    pub base_database: Option<ConnectionSpec>,
    /// Host dependencies struck during the load.
    pub isolated: Vec<String>,
    /// Non-fatal problems hit along the way.
    pub warnings: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedServiceHandle {
    /// One-line description for CLI output.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} loaded from {} (ref: {}, environment: {})",
            self.service,
            self.root.display(),
            self.reference.as_deref().unwrap_or("default branch"),
            self.environment
        );
        if !self.warnings.is_empty() {
            out.push_str(&format!(" with {} warning(s)", self.warnings.len()));
        }
        out
    }
}

fn serialize_redacted<S>(spec: &Option<ConnectionSpec>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    spec.as_ref().map(ConnectionSpec::redacted).serialize(serializer)
}
