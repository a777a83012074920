//! Dependency isolation.
//!
//! Strikes host-side copies of named dependencies from the runtime's search
//! path and loaded registry so the fetched service resolves its own copies.
//! Best-effort per dependency: an entry that cannot be isolated is reported
//! as a warning and skipped, the rest still go through.

mod native;
mod runtime;

pub use native::NativeRuntime;
pub use runtime::{HostRuntime, ModuleTable};

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::GraftError;

/// Dependencies actually struck, with the install location each one had.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyIsolationSet {
    entries: BTreeMap<String, PathBuf>,
}

impl DependencyIsolationSet {
    pub fn get(&self, name: &str) -> Option<&PathBuf> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one isolation pass.
#[derive(Debug, Default)]
pub struct IsolationReport {
    pub isolated: DependencyIsolationSet,
    /// Per-dependency `GraftError::Isolation` warnings.
    pub warnings: Vec<GraftError>,
}

/// Isolate each of `names` in turn. Never fails as a whole.
pub fn isolate(runtime: &mut dyn HostRuntime, names: &[String]) -> IsolationReport {
    let mut report = IsolationReport::default();

    for name in names {
        match runtime.isolate(name) {
            Ok(Some(location)) => {
                debug!(dependency = %name, location = %location.display(), "Isolated");
                report.isolated.entries.insert(name.clone(), location);
            }
            Ok(None) => {
                debug!(dependency = %name, "Not loaded in host, nothing to isolate");
            }
            Err(e) => {
                warn!(dependency = %name, "Skipping isolation: {}", e);
                let warning = match e {
                    w @ GraftError::Isolation { .. } => w,
                    other => GraftError::Isolation {
                        name: name.clone(),
                        reason: other.to_string(),
                    },
                };
                report.warnings.push(warning);
            }
        }
    }

    info!(
        isolated = report.isolated.len(),
        skipped = report.warnings.len(),
        "Isolation pass complete"
    );
    report
}
