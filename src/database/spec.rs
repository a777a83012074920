//! Database connection specs as normalized key/value maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;
use url::Url;

use crate::error::{GraftError, Result};

/// Keys every spec must carry before any connection is attempted.
pub const REQUIRED_KEYS: &[&str] = &["adapter", "host", "database"];

const SECRET_KEYS: &[&str] = &["password", "pass", "passwd"];

/// `" :Host-Name "` → `"host_name"`.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .trim_start_matches(':')
        .to_lowercase()
        .replace('-', "_")
}

/// Normalize every key of every nested object.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (normalize_key(&k), normalize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

/// A database connection spec: adapter, host, port, database, credentials and
/// whatever adapter-specific keys come along. Keys are always normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionSpec(Map<String, Value>);

impl ConnectionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        match normalize(Value::Object(map)) {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Build from any JSON value; only objects are accepted.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            Value::Null => Ok(Self::default()),
            other => Err(GraftError::Config(format!(
                "database config must be a mapping, got {}",
                other
            ))),
        }
    }

    /// Parse `key=value` pairs. Integer and boolean values are typed, the
    /// rest stay strings.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                GraftError::Config(format!("expected key=value, got '{}'", pair))
            })?;
            spec.set(key, scalar(raw));
        }
        Ok(spec)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(normalize_key(key), normalize(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(&normalize_key(key))
    }

    /// Value rendered as a string; nulls and empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get_str(key).is_some()
    }

    pub fn adapter(&self) -> Option<String> {
        self.get_str("adapter")
    }

    pub fn host(&self) -> Option<String> {
        self.get_str("host")
    }

    pub fn database(&self) -> Option<String> {
        self.get_str("database")
    }

    pub fn port(&self) -> Option<u16> {
        match self.get("port")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<String> {
        self.get_str("username").or_else(|| self.get_str("user"))
    }

    pub fn password(&self) -> Option<String> {
        SECRET_KEYS.iter().find_map(|k| self.get_str(k))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self` overlaid with `other`; `other` wins on every key it carries.
    pub fn merged(&self, other: &ConnectionSpec) -> ConnectionSpec {
        let mut out = self.0.clone();
        for (k, v) in &other.0 {
            out.insert(k.clone(), v.clone());
        }
        Self(out)
    }

    /// Required keys that are absent, null, or blank.
    pub fn missing_required(&self) -> Vec<String> {
        REQUIRED_KEYS
            .iter()
            .filter(|k| !self.has(k))
            .map(|k| k.to_string())
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraftError::ConfigInvalid { missing })
        }
    }

    /// Connection URL for the adapter's driver.
    ///
    /// A host that is itself a URL is used as the base; port, credentials and
    /// database from the spec only fill in what it leaves out.
    pub fn to_url(&self) -> Result<Url> {
        self.validate()?;
        let host = self.host().unwrap_or_default();
        if host.contains("://") {
            return self.overlay_url(&host);
        }

        let adapter = self.adapter().unwrap_or_default();
        let scheme = url_scheme(&adapter).ok_or_else(|| {
            GraftError::Database(format!("unsupported adapter '{}'", adapter))
        })?;
        let database = self.database().unwrap_or_default();

        let mut url = Url::parse(&format!("{}://localhost", scheme))
            .map_err(|e| GraftError::Database(e.to_string()))?;
        let host_part = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
            _ => host.clone(),
        };
        url.set_host(Some(&host_part))
            .map_err(|e| GraftError::Database(format!("invalid host '{}': {}", host, e)))?;
        let invalid = |what: &str| GraftError::Database(format!("invalid {} for {}", what, host));
        url.set_port(self.port()).map_err(|_| invalid("port"))?;
        if let Some(user) = self.username() {
            url.set_username(&user).map_err(|_| invalid("username"))?;
        }
        if let Some(password) = self.password() {
            url.set_password(Some(&password))
                .map_err(|_| invalid("password"))?;
        }
        url.set_path(&format!("/{}", database));

        let params: BTreeMap<&str, String> = ["sslmode", "ssl_mode", "charset"]
            .iter()
            .filter_map(|k| self.get_str(k).map(|v| (*k, v)))
            .collect();
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                let key = if k == "ssl_mode" { "ssl-mode" } else { k };
                query.append_pair(key, &v);
            }
        }
        Ok(url)
    }

    fn overlay_url(&self, raw: &str) -> Result<Url> {
        let mut url = Url::parse(raw)
            .map_err(|e| GraftError::Database(format!("invalid host url: {}", e)))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(GraftError::Database("host url has no host".to_string()));
        }
        let invalid = |what: &str| GraftError::Database(format!("invalid {} for host url", what));

        if url.port().is_none() {
            if let Some(port) = self.port() {
                url.set_port(Some(port)).map_err(|_| invalid("port"))?;
            }
        }
        if url.username().is_empty() {
            if let Some(user) = self.username() {
                url.set_username(&user).map_err(|_| invalid("username"))?;
            }
        }
        if url.password().is_none() {
            if let Some(password) = self.password() {
                url.set_password(Some(&password))
                    .map_err(|_| invalid("password"))?;
            }
        }
        if matches!(url.path(), "" | "/") {
            if let Some(database) = self.database() {
                url.set_path(&format!("/{}", database));
            }
        }
        Ok(url)
    }

    /// Copy safe to log: secrets masked.
    pub fn redacted(&self) -> ConnectionSpec {
        let mut out = self.clone();
        for key in SECRET_KEYS {
            if out.0.contains_key(*key) {
                out.0.insert(key.to_string(), Value::String("***".to_string()));
            }
        }
        out
    }
}

impl From<Map<String, Value>> for ConnectionSpec {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}

/// URL scheme for an adapter name, `None` when no driver handles it.
pub fn url_scheme(adapter: &str) -> Option<&'static str> {
    match normalize_key(adapter).as_str() {
        "postgres" | "postgresql" | "postgis" => Some("postgres"),
        "mysql" | "mysql2" | "trilogy" => Some("mysql"),
        _ => None,
    }
}

/// URL with the password replaced by `***`.
pub fn mask_url(url: &Url) -> String {
    let mut masked = url.clone();
    if masked.password().is_some() {
        let _ = masked.set_password(Some("***"));
    }
    masked.to_string()
}

fn scalar(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
