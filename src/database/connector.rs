//! Database connections behind a seam.
//!
//! [`SqlxConnector`] opens real connections through sqlx's `Any` driver
//! (Postgres and MySQL); [`MockConnector`] scripts outcomes per host for
//! tests.

use async_trait::async_trait;
use sqlx::{AnyConnection, Connection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::spec::{mask_url, ConnectionSpec};
use crate::error::{GraftError, Result};

/// One open database connection.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Run `query` as a liveness round trip.
    async fn probe(&mut self, query: &str) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens connections from a fully merged spec.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn DatabaseConnection>>;
}

pub struct SqlxConnector;

impl SqlxConnector {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        Self
    }
}

impl Default for SqlxConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn DatabaseConnection>> {
        let url = spec.to_url()?;
        debug!(url = %mask_url(&url), "Opening database connection");
        let conn = AnyConnection::connect(url.as_str())
            .await
            .map_err(|e| GraftError::Database(e.to_string()))?;
        Ok(Box::new(SqlxConnection { conn }))
    }
}

struct SqlxConnection {
    conn: AnyConnection,
}

#[async_trait]
impl DatabaseConnection for SqlxConnection {
    async fn probe(&mut self, query: &str) -> Result<()> {
        sqlx::query(query)
            .execute(&mut self.conn)
            .await
            .map_err(|e| GraftError::Database(e.to_string()))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| GraftError::Database(e.to_string()))
    }
}

/// What a [`MockConnector`] saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connect(String),
    Probe(String),
    Close(String),
}

/// Scripted connector: every host connects and probes fine unless a failure
/// was registered for it.
#[derive(Default, Clone)]
pub struct MockConnector {
    connect_failures: Arc<Mutex<HashMap<String, String>>>,
    probe_failures: Arc<Mutex<HashMap<String, String>>>,
    attempts: Arc<Mutex<Vec<ConnectionSpec>>>,
    events: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `connect` for `host` with `error`.
    pub fn fail_connect(self, host: &str, error: &str) -> Self {
        if let Ok(mut map) = self.connect_failures.lock() {
            map.insert(host.to_string(), error.to_string());
        }
        self
    }

    /// Connect fine, then fail the probe query for `host`.
    pub fn fail_probe(self, host: &str, error: &str) -> Self {
        if let Ok(mut map) = self.probe_failures.lock() {
            map.insert(host.to_string(), error.to_string());
        }
        self
    }

    /// Every spec passed to `connect`, in order.
    pub fn attempts(&self) -> Vec<ConnectionSpec> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, event: MockEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn DatabaseConnection>> {
        let host = spec.host().unwrap_or_default();
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(spec.clone());
        }
        self.record(MockEvent::Connect(host.clone()));

        let failure = self
            .connect_failures
            .lock()
            .ok()
            .and_then(|m| m.get(&host).cloned());
        if let Some(error) = failure {
            return Err(GraftError::Database(error));
        }
        let probe_failure = self
            .probe_failures
            .lock()
            .ok()
            .and_then(|m| m.get(&host).cloned());
        Ok(Box::new(MockConnection {
            host,
            probe_failure,
            owner: self.clone(),
        }))
    }
}

struct MockConnection {
    host: String,
    probe_failure: Option<String>,
    owner: MockConnector,
}

#[async_trait]
impl DatabaseConnection for MockConnection {
    async fn probe(&mut self, _query: &str) -> Result<()> {
        self.owner.record(MockEvent::Probe(self.host.clone()));
        match &self.probe_failure {
            Some(error) => Err(GraftError::Database(error.clone())),
            None => Ok(()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.owner.record(MockEvent::Close(self.host.clone()));
        Ok(())
    }
}
