//! Runs a fetched service's entry points inside the host runtime.

use std::path::Path;
use tracing::info;

use crate::config::LayoutConfig;
use crate::error::{GraftError, Result};
use crate::isolate::HostRuntime;
use crate::process::resolve_in;
use crate::registry::ServiceDescriptor;

pub struct ApplicationLoader<'a> {
    layout: &'a LayoutConfig,
}

impl<'a> ApplicationLoader<'a> {
    pub fn new(layout: &'a LayoutConfig) -> Self {
        Self { layout }
    }

    /// Pre-load hook, then boot, then application, then finish loading.
    ///
    /// There is no rollback: whatever loaded before a failure stays loaded.
    pub fn load(
        &self,
        runtime: &mut dyn HostRuntime,
        service: &ServiceDescriptor,
        root: &Path,
    ) -> Result<()> {
        if let Some(hook) = service.before_load {
            info!(service = service.name, "Running pre-load hook");
            hook(runtime);
        }

        for (stage, entry) in [
            ("boot", &self.layout.boot),
            ("application", &self.layout.application),
        ] {
            let path = resolve_in(root, entry);
            info!(entry = %path.display(), "Loading {}", stage);
            runtime.require(&path).map_err(|e| load_failed(stage, e))?;
        }

        info!(root = %root.display(), "Finishing application load");
        runtime
            .finish_loading(root)
            .map_err(|e| load_failed("finish loading", e))?;
        info!(service = service.name, "Application loaded");
        Ok(())
    }
}

/// Keep the runtime's own cause verbatim, naming the stage it came from.
fn load_failed(stage: &str, err: GraftError) -> GraftError {
    let cause = match err {
        GraftError::LoadFailed { stage: inner, cause } if inner != stage => {
            format!("{}: {}", inner, cause)
        }
        GraftError::LoadFailed { cause, .. } => cause,
        other => other.to_string(),
    };
    GraftError::LoadFailed {
        stage: stage.to_string(),
        cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::ModuleTable;

    fn service_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/boot.rb"), "").unwrap();
        std::fs::write(dir.path().join("config/application.rb"), "").unwrap();
        dir
    }

    fn strike_json(runtime: &mut dyn HostRuntime) {
        let _ = runtime.isolate("json");
    }

    #[test]
    fn test_load_order() {
        let root = service_tree();
        let layout = LayoutConfig::default();
        let mut table = ModuleTable::new();
        let svc = ServiceDescriptor::new("catalog", "git@host:catalog.git");

        ApplicationLoader::new(&layout)
            .load(&mut table, &svc, root.path())
            .unwrap();

        assert_eq!(
            table.required(),
            &[
                root.path().join("config/boot.rb"),
                root.path().join("config/application.rb")
            ]
        );
        assert_eq!(table.finished(), &[root.path().to_path_buf()]);
    }

    #[test]
    fn test_hook_runs_before_boot() {
        let root = service_tree();
        let layout = LayoutConfig::default();
        let mut table = ModuleTable::new();
        table.register("json", Some("/host/gems/json-2.6.3".into()));
        let svc = ServiceDescriptor::new("catalog", "git@host:catalog.git").with_hook(strike_json);

        ApplicationLoader::new(&layout)
            .load(&mut table, &svc, root.path())
            .unwrap();
        assert!(!table.is_loaded("json"));
    }

    #[test]
    fn test_missing_application_is_load_failed() {
        let root = service_tree();
        std::fs::remove_file(root.path().join("config/application.rb")).unwrap();
        let layout = LayoutConfig::default();
        let mut table = ModuleTable::new();
        let svc = ServiceDescriptor::new("catalog", "git@host:catalog.git");

        let err = ApplicationLoader::new(&layout)
            .load(&mut table, &svc, root.path())
            .unwrap_err();
        match err {
            GraftError::LoadFailed { stage, cause } => {
                assert_eq!(stage, "application");
                assert!(cause.ends_with("no such file"));
            }
            other => panic!("expected LoadFailed, got {:?}", other),
        }
        // boot stays loaded
        assert_eq!(table.required().len(), 1);
        assert!(table.finished().is_empty());
    }
}
