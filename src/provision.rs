//! Scoped dependency provisioning.
//!
//! Runs the service's package manager once, inside the service root, with an
//! install root private to the workspace. The host's own package-manager
//! variables are stripped from the child's environment; nothing in the host
//! process environment changes.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ProvisionConfig;
use crate::error::{GraftError, Result};
use crate::process::{CommandRunner, Invocation};

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// Directory the dependencies were installed into.
    pub install_dir: PathBuf,
    pub manifest: PathBuf,
    /// Combined package-manager output.
    pub output: String,
}

pub struct Provisioner<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ProvisionConfig,
}

impl<'a> Provisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a ProvisionConfig) -> Self {
        Self { runner, config }
    }

    /// Host variable names that must not leak into the child.
    pub fn stripped_vars<I>(&self, host_vars: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut out: Vec<String> = host_vars
            .into_iter()
            .filter(|key| {
                self.config
                    .strip_env_prefixes
                    .iter()
                    .any(|p| key.starts_with(p.as_str()))
                    || self.config.strip_env.contains(key)
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// The install command for `root`, with the unbundled environment built
    /// from `host_vars`.
    pub fn invocation<I>(&self, root: &Path, install_dir: &Path, host_vars: I) -> Invocation
    where
        I: IntoIterator<Item = String>,
    {
        let manifest = root.join(&self.config.manifest);
        let mut invocation = Invocation::new(&self.config.program, root)
            .args(self.config.args.iter().cloned());
        for key in self.stripped_vars(host_vars) {
            invocation = invocation.env_remove(key);
        }
        invocation
            .env(
                &self.config.install_root_env,
                install_dir.to_string_lossy().to_string(),
            )
            .env(
                &self.config.manifest_env,
                manifest.to_string_lossy().to_string(),
            )
    }

    /// Install the service's dependencies into `install_dir`.
    ///
    /// One attempt. Every failure comes back as `ProvisionFailed`, which the
    /// caller treats as a warning.
    pub async fn provision(&self, root: &Path, install_dir: &Path) -> Result<ProvisionReport> {
        let failed = |output: String| GraftError::ProvisionFailed {
            dir: root.display().to_string(),
            output,
        };

        let manifest = root.join(&self.config.manifest);
        if !manifest.is_file() {
            return Err(failed(format!("no {} at service root", self.config.manifest)));
        }
        std::fs::create_dir_all(install_dir).map_err(|e| {
            failed(format!(
                "cannot create install dir {}: {}",
                install_dir.display(),
                e
            ))
        })?;

        let host_vars = std::env::vars().map(|(k, _)| k);
        let invocation = self.invocation(root, install_dir, host_vars);

        info!(
            command = %invocation.display(),
            install_dir = %install_dir.display(),
            "Installing dependencies"
        );
        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !output.is_success() {
            warn!(status = %output.status_label(), "Dependency install failed");
            return Err(failed(output.combined()));
        }

        info!(install_dir = %install_dir.display(), "Dependencies installed");
        Ok(ProvisionReport {
            install_dir: install_dir.to_path_buf(),
            manifest,
            output: output.combined(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, MockRunner};

    fn service_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Gemfile"), "source 'https://rubygems.org'\n").unwrap();
        dir
    }

    fn host_vars(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stripped_vars() {
        let config = ProvisionConfig::default();
        let runner = MockRunner::new();
        let provisioner = Provisioner::new(&runner, &config);
        let stripped = provisioner.stripped_vars(host_vars(&[
            "PATH",
            "BUNDLE_GEMFILE",
            "BUNDLER_VERSION",
            "RUBYOPT",
            "RUBYLIB",
            "RUBY_VERSION",
            "HOME",
        ]));
        assert_eq!(
            stripped,
            vec!["BUNDLER_VERSION", "BUNDLE_GEMFILE", "RUBYLIB", "RUBYOPT"]
        );
    }

    #[test]
    fn test_invocation_is_unbundled() {
        let config = ProvisionConfig::default();
        let runner = MockRunner::new();
        let provisioner = Provisioner::new(&runner, &config);
        let inv = provisioner.invocation(
            Path::new("/ws/svc"),
            Path::new("/ws/.graft-deps/1-a"),
            host_vars(&["BUNDLE_PATH", "RUBYOPT", "PATH"]),
        );

        assert_eq!(inv.program, "bundle");
        assert_eq!(inv.args, vec!["install"]);
        assert_eq!(inv.cwd, PathBuf::from("/ws/svc"));
        assert_eq!(inv.env_remove, vec!["BUNDLE_PATH", "RUBYOPT"]);
        assert_eq!(
            inv.env.get("BUNDLE_PATH").map(String::as_str),
            Some("/ws/.graft-deps/1-a")
        );
        assert_eq!(
            inv.env.get("BUNDLE_GEMFILE").map(String::as_str),
            Some("/ws/svc/Gemfile")
        );
    }

    #[tokio::test]
    async fn test_provision_success() {
        let root = service_root();
        let install_dir = root.path().join(".graft-deps/1-run");
        let config = ProvisionConfig::default();
        let runner = MockRunner::new().on(
            "bundle",
            Some("install"),
            CommandOutput::success("Bundle complete!"),
        );

        let report = Provisioner::new(&runner, &config)
            .provision(root.path(), &install_dir)
            .await
            .unwrap();

        assert_eq!(report.install_dir, install_dir);
        assert!(install_dir.is_dir());
        assert_eq!(report.output, "Bundle complete!");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_failure_is_warning() {
        let root = service_root();
        let config = ProvisionConfig::default();
        let runner = MockRunner::new().on(
            "bundle",
            None,
            CommandOutput::failure(5, "Could not find gem 'pg'"),
        );

        let err = Provisioner::new(&runner, &config)
            .provision(root.path(), &root.path().join("deps"))
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("Could not find gem 'pg'"));
        // single attempt
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_without_manifest() {
        let root = tempfile::tempdir().unwrap();
        let config = ProvisionConfig::default();
        let runner = MockRunner::new();

        let err = Provisioner::new(&runner, &config)
            .provision(root.path(), &root.path().join("deps"))
            .await
            .unwrap_err();
        assert!(matches!(err, GraftError::ProvisionFailed { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provision_leaves_host_env_alone() {
        let root = service_root();
        let config = ProvisionConfig {
            install_root_env: "GRAFT_TEST_INSTALL_ROOT".to_string(),
            ..ProvisionConfig::default()
        };
        let runner = MockRunner::new();

        Provisioner::new(&runner, &config)
            .provision(root.path(), &root.path().join("deps"))
            .await
            .unwrap();
        assert!(std::env::var("GRAFT_TEST_INSTALL_ROOT").is_err());
        assert!(runner.calls()[0]
            .env
            .contains_key("GRAFT_TEST_INSTALL_ROOT"));
    }
}
