//! Candidate resolution: merge, expand, validate, then connect in order.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::connector::{Connector, DatabaseConnection};
use super::hosts::HostConvention;
use super::spec::{normalize_key, ConnectionSpec};
use crate::config::DatabaseConfig;
use crate::error::{GraftError, Result};

static NETWORK_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)could not translate host name|name or service not known|nodename nor servname|failed to lookup address|no such host|temporary failure in name resolution|connection refused|timed out|network is unreachable|no route to host|dns error",
    )
    .expect("static regex")
});

/// The connection that won, with the spec it was opened from.
pub struct ActiveConnection {
    spec: ConnectionSpec,
    connection: Box<dyn DatabaseConnection>,
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("spec", &self.spec.redacted())
            .finish()
    }
}

impl ActiveConnection {
    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    pub fn host(&self) -> String {
        self.spec.host().unwrap_or_default()
    }

    /// Re-run the liveness query on the open connection.
    pub async fn probe(&mut self, query: &str) -> Result<()> {
        self.connection.probe(query).await
    }

    pub async fn close(self) -> Result<()> {
        self.connection.close().await
    }
}

/// Turns a base spec plus a caller override into an active connection.
///
/// Holds at most one active connection; every attempt closes the previous
/// one first. Nothing is cached between calls.
pub struct DatabaseResolver {
    convention: HostConvention,
    default_ports: BTreeMap<String, u16>,
    probe_query: String,
    connector: Arc<dyn Connector>,
    active: Option<ActiveConnection>,
}

impl DatabaseResolver {
    pub fn new(config: &DatabaseConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            convention: HostConvention::from(&config.convention),
            default_ports: config
                .default_ports
                .iter()
                .map(|(k, v)| (normalize_key(k), *v))
                .collect(),
            probe_query: config.probe_query.clone(),
            connector,
            active: None,
        }
    }

    pub fn convention(&self) -> &HostConvention {
        &self.convention
    }

    pub fn active(&self) -> Option<&ActiveConnection> {
        self.active.as_ref()
    }

    pub fn default_port(&self, adapter: &str) -> Option<u16> {
        self.default_ports.get(&normalize_key(adapter)).copied()
    }

    /// Fully merged candidate specs in attempt order.
    ///
    /// Precedence, lowest first: base, override, candidate host. Only a host
    /// supplied by the override is expanded. When the override names a host
    /// and no port is given anywhere, the adapter's standard port is filled
    /// in. Fails with `ConfigInvalid` before producing anything if a required
    /// key is missing.
    pub fn candidates(
        &self,
        base: &ConnectionSpec,
        override_spec: &ConnectionSpec,
    ) -> Result<Vec<ConnectionSpec>> {
        let mut merged = base.merged(override_spec);
        merged.validate()?;

        let Some(override_host) = override_spec.host() else {
            return Ok(vec![merged]);
        };

        if merged.port().is_none() {
            if let Some(port) = merged.adapter().and_then(|a| self.default_port(&a)) {
                merged.set("port", port);
            }
        }

        Ok(self
            .convention
            .expand(&override_host)
            .into_iter()
            .map(|host| {
                let mut candidate = merged.clone();
                candidate.set("host", host);
                candidate
            })
            .collect())
    }

    /// Hint shown when `error` looks like a name-resolution or reachability
    /// problem.
    pub fn network_hint(&self, error: &str) -> Option<String> {
        NETWORK_ERROR.is_match(error).then(|| {
            format!(
                "the host could not be reached; hosts under {} are only reachable through the VPN tunnel, check that it is connected",
                self.convention.tunnel_domain()
            )
        })
    }

    /// Try every candidate in order; the first that connects and answers the
    /// probe query becomes active.
    pub async fn configure(
        &mut self,
        base: &ConnectionSpec,
        override_spec: &ConnectionSpec,
    ) -> Result<&ActiveConnection> {
        let candidates = self.candidates(base, override_spec)?;
        let mut tried = Vec::with_capacity(candidates.len());
        let mut last_error = String::new();

        for candidate in candidates {
            let host = candidate.host().unwrap_or_default();
            tried.push(host.clone());

            if let Some(previous) = self.active.take() {
                if let Err(e) = previous.close().await {
                    warn!("Closing previous connection failed: {}", e);
                }
            }

            info!(host = %host, "Connecting to database");
            let mut connection = match self.connector.connect(&candidate).await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(host = %host, "Connection failed: {}", e);
                    last_error = e.to_string();
                    continue;
                }
            };

            if let Err(e) = connection.probe(&self.probe_query).await {
                warn!(host = %host, "Probe query failed: {}", e);
                last_error = e.to_string();
                if let Err(close_err) = connection.close().await {
                    warn!(host = %host, "Closing failed connection: {}", close_err);
                }
                continue;
            }

            info!(host = %host, "Database connection established");
            let active = self.active.insert(ActiveConnection {
                spec: candidate,
                connection,
            });
            return Ok(&*active);
        }

        let hint = self.network_hint(&last_error);
        Err(GraftError::AllCandidatesFailed {
            hosts: tried,
            last_error,
            hint,
        })
    }

    /// Close the active connection, if any.
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.active.take() {
            Some(active) => active.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connector::{MockConnector, MockEvent};
    use serde_json::json;

    fn spec(value: serde_json::Value) -> ConnectionSpec {
        ConnectionSpec::from_value(value).unwrap()
    }

    fn resolver(connector: &MockConnector) -> DatabaseResolver {
        DatabaseResolver::new(&DatabaseConfig::default(), Arc::new(connector.clone()))
    }

    fn hosts(specs: &[ConnectionSpec]) -> Vec<String> {
        specs.iter().map(|s| s.host().unwrap_or_default()).collect()
    }

    #[test]
    fn test_candidates_override_host_expands() {
        let r = resolver(&MockConnector::new());
        let base = spec(json!({ "adapter": "postgres", "host": "old", "port": 1, "database": "app", "user": "u" }));
        let over = spec(json!({ "host": "my.acme.dyn.example.com", "database": "app", "adapter": "postgres" }));

        let candidates = r.candidates(&base, &over).unwrap();
        assert_eq!(
            hosts(&candidates),
            vec![
                "my.acme.dyn.example.com",
                "db.acme.dyn.example.com",
                "db.acme.example.com",
                "my.acme.example.com",
            ]
        );
        for c in &candidates {
            assert_eq!(c.get_str("user").as_deref(), Some("u"));
            assert_eq!(c.port(), Some(1));
        }
    }

    #[test]
    fn test_candidates_bare_label_defaults_port() {
        let r = resolver(&MockConnector::new());
        let over = spec(json!({ "adapter": "postgresql", "host": "noki-7", "database": "app" }));
        let candidates = r.candidates(&ConnectionSpec::new(), &over).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].host().as_deref(),
            Some("db.noki-7.dyn.example.com")
        );
        assert_eq!(candidates[0].port(), Some(5432));
    }

    #[test]
    fn test_candidates_ip_literal_untouched() {
        let r = resolver(&MockConnector::new());
        let over = spec(json!({ "adapter": "mysql2", "host": "10.0.0.5", "database": "app" }));
        let candidates = r.candidates(&ConnectionSpec::new(), &over).unwrap();
        assert_eq!(hosts(&candidates), vec!["10.0.0.5"]);
        assert_eq!(candidates[0].port(), Some(3306));
    }

    #[tokio::test]
    async fn test_configure_url_host_is_single_untouched_candidate() {
        let connector = MockConnector::new();
        let mut r = resolver(&connector);
        let url = "postgres://db.acme.dyn.example.com:6432/app";
        let over = spec(json!({ "adapter": "postgres", "host": url, "database": "app" }));

        let active = r.configure(&ConnectionSpec::new(), &over).await.unwrap();
        assert_eq!(active.host(), url);
        let dial = active.spec().to_url().unwrap();
        assert_eq!(dial.host_str(), Some("db.acme.dyn.example.com"));
        assert_eq!(dial.port(), Some(6432));
        assert_eq!(hosts(&connector.attempts()), vec![url]);
    }

    #[test]
    fn test_candidates_without_override_host() {
        let r = resolver(&MockConnector::new());
        let base = spec(json!({ "adapter": "postgres", "host": "db.acme.example.com", "database": "app" }));
        let over = spec(json!({ "pool": 2 }));
        let candidates = r.candidates(&base, &over).unwrap();
        assert_eq!(hosts(&candidates), vec!["db.acme.example.com"]);
        assert_eq!(candidates[0].port(), None);
        assert_eq!(candidates[0].get_str("pool").as_deref(), Some("2"));
    }

    #[test]
    fn test_candidates_unknown_adapter_keeps_port_unset() {
        let r = resolver(&MockConnector::new());
        let over = spec(json!({ "adapter": "sqlserver", "host": "noki-7", "database": "app" }));
        let candidates = r.candidates(&ConnectionSpec::new(), &over).unwrap();
        assert_eq!(candidates[0].port(), None);
    }

    #[tokio::test]
    async fn test_missing_database_fails_before_connecting() {
        let connector = MockConnector::new();
        let mut r = resolver(&connector);
        let over = spec(json!({ "adapter": "postgres", "host": "noki-7" }));
        let err = r.configure(&ConnectionSpec::new(), &over).await.unwrap_err();
        match err {
            GraftError::ConfigInvalid { missing } => assert_eq!(missing, vec!["database"]),
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
        assert!(connector.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_configure_first_success_wins() {
        let connector = MockConnector::new()
            .fail_connect("db.acme.dyn.example.com", "failed to lookup address information")
            .fail_probe("my.acme.dyn.example.com", "permission denied for database app");
        let mut r = resolver(&connector);
        let over = spec(json!({ "adapter": "postgres", "host": "db.acme.dyn.example.com", "database": "app" }));

        let active = r.configure(&ConnectionSpec::new(), &over).await.unwrap();
        assert_eq!(active.host(), "db.acme.example.com");
        assert_eq!(
            connector.events(),
            vec![
                MockEvent::Connect("db.acme.dyn.example.com".into()),
                MockEvent::Connect("my.acme.dyn.example.com".into()),
                MockEvent::Probe("my.acme.dyn.example.com".into()),
                MockEvent::Close("my.acme.dyn.example.com".into()),
                MockEvent::Connect("db.acme.example.com".into()),
                MockEvent::Probe("db.acme.example.com".into()),
            ]
        );
        assert!(r.active().is_some());
    }

    #[tokio::test]
    async fn test_configure_closes_previous_active() {
        let connector = MockConnector::new();
        let mut r = resolver(&connector);
        let over = spec(json!({ "adapter": "postgres", "host": "10.0.0.5", "database": "app" }));
        r.configure(&ConnectionSpec::new(), &over).await.unwrap();
        r.configure(&ConnectionSpec::new(), &over).await.unwrap();

        let events = connector.events();
        assert_eq!(events[2], MockEvent::Close("10.0.0.5".into()));
        assert_eq!(events[3], MockEvent::Connect("10.0.0.5".into()));

        r.disconnect().await.unwrap();
        assert!(r.active().is_none());
        assert_eq!(
            connector.events().last(),
            Some(&MockEvent::Close("10.0.0.5".into()))
        );
    }

    #[tokio::test]
    async fn test_all_candidates_failed_with_hint() {
        let err_text = "error communicating with database: failed to lookup address information: Name or service not known";
        let mut connector = MockConnector::new();
        for host in [
            "db.acme.dyn.example.com",
            "my.acme.dyn.example.com",
            "db.acme.example.com",
            "my.acme.example.com",
        ] {
            connector = connector.fail_connect(host, err_text);
        }
        let mut r = resolver(&connector);
        let over = spec(json!({ "adapter": "postgres", "host": "db.acme.dyn.example.com", "database": "app" }));

        match r.configure(&ConnectionSpec::new(), &over).await.unwrap_err() {
            GraftError::AllCandidatesFailed {
                hosts,
                last_error,
                hint,
            } => {
                assert_eq!(hosts.len(), 4);
                assert!(last_error.contains("Name or service not known"));
                assert!(hint.unwrap().contains("dyn.example.com"));
            }
            other => panic!("expected AllCandidatesFailed, got {:?}", other),
        }
        assert!(r.active().is_none());
    }

    #[tokio::test]
    async fn test_all_candidates_failed_without_hint() {
        let connector =
            MockConnector::new().fail_connect("10.0.0.5", "password authentication failed for user \"u\"");
        let mut r = resolver(&connector);
        let over = spec(json!({ "adapter": "postgres", "host": "10.0.0.5", "database": "app" }));
        match r.configure(&ConnectionSpec::new(), &over).await.unwrap_err() {
            GraftError::AllCandidatesFailed { hosts, hint, .. } => {
                assert_eq!(hosts, vec!["10.0.0.5"]);
                assert!(hint.is_none());
            }
            other => panic!("expected AllCandidatesFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_network_hint_patterns() {
        let r = resolver(&MockConnector::new());
        assert!(r.network_hint("could not translate host name \"x\" to address").is_some());
        assert!(r.network_hint("Connection refused (os error 111)").is_some());
        assert!(r.network_hint("pool timed out while waiting").is_some());
        assert!(r.network_hint("relation \"users\" does not exist").is_none());
    }
}
