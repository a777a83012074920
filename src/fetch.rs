//! Source retrieval into a disposable workspace.
//!
//! Shells out to the system `git` binary through [`CommandRunner`]. No libgit2
//! dependency. Writes only under the workspace directory.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

use crate::error::{GraftError, Result};
use crate::process::{CommandRunner, Invocation};
use crate::registry::ServiceDescriptor;

const DEPS_DIR: &str = ".graft-deps";

/// Directory owned by one load.
///
/// Always a fresh temp dir, removed on [`Workspace::teardown`] or on drop.
/// When a local source override is attached, the service source is read from
/// there instead of being cloned, and the override is never touched.
#[derive(Debug)]
pub struct Workspace {
    temp: TempDir,
    local_source: Option<PathBuf>,
}

impl Workspace {
    /// Create a fresh directory under `base`.
    pub fn create(base: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(base)?;
        let temp = tempfile::Builder::new().prefix(prefix).tempdir_in(base)?;
        Ok(Self {
            temp,
            local_source: None,
        })
    }

    /// Use an existing service checkout instead of cloning.
    pub fn with_local_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_source = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn local_source(&self) -> Option<&Path> {
        self.local_source.as_deref()
    }

    /// Workspace-private install root, keyed by process id and run id so
    /// concurrent loads never share it.
    pub fn install_dir(&self, run_id: &str) -> PathBuf {
        self.path()
            .join(DEPS_DIR)
            .join(format!("{}-{}", std::process::id(), run_id))
    }

    /// Remove the workspace directory. A local source is left alone.
    pub fn teardown(self) -> Result<()> {
        info!(workspace = %self.path().display(), "Removing workspace");
        self.temp.close()?;
        Ok(())
    }
}

/// Clones a service's repository into a workspace.
pub struct SourceFetcher<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Materialize the service source and return its root.
    ///
    /// A local source is returned untouched. Otherwise the repository is
    /// cloned at depth 1; with `reference`, exactly that ref is fetched
    /// shallowly and checked out. Any failure is fatal; there is no fallback
    /// to the default branch.
    pub async fn fetch(
        &self,
        service: &ServiceDescriptor,
        workspace: &Workspace,
        reference: Option<&str>,
    ) -> Result<PathBuf> {
        if let Some(local) = workspace.local_source() {
            let root = local.to_path_buf();
            if !root.is_dir() {
                return Err(GraftError::Config(format!(
                    "local override '{}' is not a directory",
                    root.display()
                )));
            }
            info!(root = %root.display(), "Using local source, skipping clone");
            return Ok(root);
        }

        let dir_name = service.checkout_dir();
        let root = workspace.path().join(&dir_name);

        info!(repository = %service.repository, "Cloning repository");
        self.git(
            workspace.path(),
            &["clone", "--depth", "1", &service.repository, &dir_name],
        )
        .await?;
        info!(root = %root.display(), "Clone complete");

        match reference {
            Some(reference) => {
                info!(reference, "Fetching ref");
                self.git(&root, &["fetch", "--depth", "1", "origin", reference])
                    .await?;
                self.git(&root, &["checkout", "--detach", "FETCH_HEAD"])
                    .await?;
                info!(reference, "Checked out ref");
            }
            None => info!("Using default branch"),
        }

        Ok(root)
    }

    /// Run `git <args>` in `dir`; a spawn failure or non-zero exit becomes
    /// `FetchFailed` with whatever output there is.
    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let invocation = Invocation::new("git", dir)
            .args(args.iter().copied())
            .env("GIT_TERMINAL_PROMPT", "0");
        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| GraftError::FetchFailed {
                command: invocation.display(),
                status: "not started".to_string(),
                output: e.to_string(),
            })?;

        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(GraftError::FetchFailed {
                command: invocation.display(),
                status: output.status_label(),
                output: output.combined(),
            })
        }
    }
}
