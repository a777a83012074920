//! Base spec from a service's `config/database.yml`.
//!
//! The file is keyed by environment name. Anchors and `<<` merge keys are
//! resolved, and the two ERB forms services actually use for credentials are
//! substituted from the process environment:
//! `<%= ENV['X'] %>` and `<%= ENV.fetch('X', 'default') %>`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::path::Path;

use super::spec::ConnectionSpec;
use crate::error::{GraftError, Result};

static ERB_ENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<%=\s*ENV(?:\[\s*['"](?P<key>[A-Za-z0-9_]+)['"]\s*\]|\.fetch\(\s*['"](?P<fkey>[A-Za-z0-9_]+)['"]\s*(?:,\s*['"]?(?P<default>[^'")]*)['"]?\s*)?\))\s*%>"#,
    )
    .expect("static regex")
});

/// Replace ERB env lookups using `lookup`. Unset variables without a default
/// become empty strings.
pub fn substitute_env<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ERB_ENV
        .replace_all(text, |caps: &Captures| {
            if let Some(key) = caps.name("key") {
                return lookup(key.as_str()).unwrap_or_default();
            }
            let key = caps.name("fkey").map(|m| m.as_str()).unwrap_or_default();
            lookup(key)
                .or_else(|| caps.name("default").map(|m| m.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Parse database.yml text and pick the `environment` section.
///
/// Returns `None` when the environment has no section.
pub fn parse_base_spec<F>(text: &str, environment: &str, lookup: F) -> Result<Option<ConnectionSpec>>
where
    F: Fn(&str) -> Option<String>,
{
    let rendered = substitute_env(text, lookup);
    let mut doc: serde_yaml::Value = serde_yaml::from_str(&rendered)?;
    doc.apply_merge()?;

    let section = match doc.get(environment) {
        Some(section) => section.clone(),
        None => return Ok(None),
    };
    let value: Value = serde_json::to_value(section)?;
    match value {
        Value::Object(_) => ConnectionSpec::from_value(value).map(Some),
        Value::Null => Ok(None),
        other => Err(GraftError::Config(format!(
            "database.yml section '{}' is not a mapping: {}",
            environment, other
        ))),
    }
}

/// Read the base spec for `environment` from `path`.
///
/// A missing file is not an error: services without a database simply have
/// no base spec.
pub fn read_base_spec(path: &Path, environment: &str) -> Result<Option<ConnectionSpec>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    parse_base_spec(&text, environment, |key| std::env::var(key).ok())
}
