//! Service manager: the load pipeline and on-demand database configuration.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::application::ApplicationLoader;
use super::environment::{self, LoadEnvironment};
use super::{LoadedServiceHandle, StageDriver, StageOutcome};
use crate::config::Config;
use crate::database::{
    read_base_spec, ActiveConnection, ConnectionSpec, Connector, DatabaseResolver, SqlxConnector,
};
use crate::error::{GraftError, Result};
use crate::fetch::{SourceFetcher, Workspace};
use crate::isolate::{self, HostRuntime, NativeRuntime};
use crate::process::{resolve_in, CommandRunner, TokioRunner};
use crate::provision::Provisioner;
use crate::registry::{ServiceDescriptor, ServiceRegistry};

/// Loads services into the host runtime and negotiates their database
/// connection.
///
/// Loads run one at a time and mutate the runtime in place; nothing is
/// restored afterwards.
pub struct ServiceManager<R: HostRuntime = NativeRuntime> {
    config: Config,
    registry: ServiceRegistry,
    runner: Arc<dyn CommandRunner>,
    runtime: R,
    resolver: DatabaseResolver,
    loaded: Vec<LoadedServiceHandle>,
}

impl ServiceManager<NativeRuntime> {
    /// Built-in catalog, real subprocesses, native runtime, sqlx connections.
    pub fn with_defaults(config: Config) -> Self {
        Self::new(
            config,
            ServiceRegistry::builtin(),
            Arc::new(TokioRunner),
            NativeRuntime::from_env(),
            Arc::new(SqlxConnector::new()),
        )
    }
}

impl<R: HostRuntime> ServiceManager<R> {
    pub fn new(
        config: Config,
        registry: ServiceRegistry,
        runner: Arc<dyn CommandRunner>,
        runtime: R,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let resolver = DatabaseResolver::new(&config.database, connector);
        Self {
            config,
            registry,
            runner,
            runtime,
            resolver,
            loaded: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Service names in catalog order.
    pub fn list_services(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// Every service loaded so far, oldest first.
    pub fn loaded(&self) -> &[LoadedServiceHandle] {
        &self.loaded
    }

    pub fn active_connection(&self) -> Option<&ActiveConnection> {
        self.resolver.active()
    }

    /// Fetch, provision and load `name`, optionally pinned to `reference`.
    ///
    /// Unknown names fail before any filesystem or network access. The
    /// workspace is removed however the load ends.
    pub async fn load(
        &mut self,
        name: &str,
        reference: Option<&str>,
    ) -> Result<LoadedServiceHandle> {
        let service = self.registry.lookup(name)?.clone();
        let started = Instant::now();

        let mut workspace = Workspace::create(
            &self.config.workspace_base(),
            &self.config.workspace.prefix,
        )?;
        if let Some(local) = environment::local_source(&self.config.environment) {
            info!(path = %local.display(), "Local source override set");
            workspace = workspace.with_local_source(local);
        }
        info!(service = service.name, workspace = %workspace.path().display(), "Loading service");

        let result = self.run_pipeline(&service, &workspace, reference).await;

        if let Err(e) = workspace.teardown() {
            warn!("Workspace cleanup failed: {}", e);
        }

        let handle = result?;
        info!(
            service = service.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "done"
        );
        self.loaded.push(handle.clone());
        Ok(handle)
    }

    async fn run_pipeline(
        &mut self,
        service: &ServiceDescriptor,
        workspace: &Workspace,
        reference: Option<&str>,
    ) -> Result<LoadedServiceHandle> {
        let mut driver = StageDriver::new(service.name);
        let run_id = uuid::Uuid::new_v4().simple().to_string();

        driver.begin("fetch");
        let fetched = SourceFetcher::new(self.runner.as_ref())
            .fetch(service, workspace, reference)
            .await;
        let root = driver.require("fetch", fetched)?;

        let LoadEnvironment {
            environment,
            platform,
        } = environment::apply(&self.config.environment);

        driver.begin("isolate common");
        let common = self.config.isolation.common.clone();
        let mut isolated = self.isolate_stage(&mut driver, "isolate common", &common)?;

        driver.begin("provision");
        let install_dir = workspace.install_dir(&run_id[..8]);
        let provisioned = Provisioner::new(self.runner.as_ref(), &self.config.provision)
            .provision(&root, &install_dir)
            .await;
        if let Ok(report) = &provisioned {
            self.runtime.prepend_search_path(report.install_dir.clone());
        }
        driver.finish("provision", StageOutcome::from_result(provisioned))?;

        driver.begin("isolate service");
        isolated.extend(self.isolate_stage(&mut driver, "isolate service", &service.isolate)?);

        driver.begin("load application");
        let loaded =
            ApplicationLoader::new(&self.config.layout).load(&mut self.runtime, service, &root);
        driver.finish("load application", StageOutcome::from_result(loaded))?;

        let database_file = resolve_in(&root, &self.config.layout.database);
        let base_database = match read_base_spec(&database_file, &environment) {
            Ok(spec) => spec,
            Err(e) => {
                driver.finish(
                    "read database config",
                    StageOutcome::Warning(GraftError::Config(format!(
                        "{}: {}",
                        database_file.display(),
                        e
                    ))),
                )?;
                None
            }
        };

        isolated.sort();
        isolated.dedup();
        Ok(LoadedServiceHandle {
            service: service.name.to_string(),
            root,
            reference: reference.map(str::to_string),
            environment,
            platform,
            base_database,
            isolated,
            warnings: driver
                .into_warnings()
                .into_iter()
                .map(|w| w.to_string())
                .collect(),
            loaded_at: chrono::Utc::now(),
        })
    }

    fn isolate_stage(
        &mut self,
        driver: &mut StageDriver,
        stage: &str,
        names: &[String],
    ) -> Result<Vec<String>> {
        let report = isolate::isolate(&mut self.runtime, names);
        let isolated = report
            .isolated
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        if report.warnings.is_empty() {
            driver.finish(stage, StageOutcome::Ok)?;
        }
        for warning in report.warnings {
            driver.finish(stage, StageOutcome::Warning(warning))?;
        }
        Ok(isolated)
    }

    /// Connect the most recently loaded service to its database, with
    /// `override_spec` merged over the service's own spec.
    pub async fn configure_database(
        &mut self,
        override_spec: &ConnectionSpec,
    ) -> Result<&ActiveConnection> {
        let base = self
            .loaded
            .last()
            .and_then(|h| h.base_database.clone())
            .unwrap_or_default();
        self.configure_database_with(&base, override_spec).await
    }

    /// Like [`ServiceManager::configure_database`] with an explicit base spec.
    pub async fn configure_database_with(
        &mut self,
        base: &ConnectionSpec,
        override_spec: &ConnectionSpec,
    ) -> Result<&ActiveConnection> {
        crate::log_component!(info, "database", "configuring database connection");
        self.resolver.configure(base, override_spec).await
    }

    /// Close the active database connection, if any.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.resolver.disconnect().await
    }
}
