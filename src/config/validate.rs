//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "workspace",
    "environment",
    "provision",
    "isolation",
    "layout",
    "database",
    "logging",
];

/// Known fields per section.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("workspace", &["base_dir", "prefix"]),
    (
        "environment",
        &[
            "env_var",
            "default_env",
            "platform_var",
            "default_platform",
            "local_path_var",
        ],
    ),
    (
        "provision",
        &[
            "program",
            "args",
            "manifest",
            "install_root_env",
            "manifest_env",
            "strip_env_prefixes",
            "strip_env",
        ],
    ),
    ("isolation", &["common"]),
    ("layout", &["boot", "application", "database"]),
    ("database", &["convention", "default_ports", "probe_query"]),
    ("logging", &["format", "level", "file"]),
];

const KNOWN_CONVENTION: &[&str] = &[
    "canonical_prefix",
    "friendly_prefix",
    "direct_domain",
    "tunnel_domain",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(a_len + 1) {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate().take(b_len + 1) {
        *val = j;
    }

    for (i, ca) in a.chars().enumerate() {
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a_len][b_len]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path,
            message: msg,
        });
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                path: String::new(),
                message: "Config must be a JSON object".to_string(),
            });
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic {
        level: DiagnosticLevel::Ok,
        path: String::new(),
        message: "Valid JSON".to_string(),
    });

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    for (section, known) in KNOWN_SECTIONS {
        if let Some(section_obj) = obj.get(*section).and_then(|v| v.as_object()) {
            has_unknown |= check_keys(section_obj, known, section, &mut diagnostics);
        }
    }

    if let Some(convention) = obj
        .get("database")
        .and_then(|v| v.get("convention"))
        .and_then(|v| v.as_object())
    {
        has_unknown |= check_keys(
            convention,
            KNOWN_CONVENTION,
            "database.convention",
            &mut diagnostics,
        );
    }

    if !has_unknown {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "All fields recognized".to_string(),
        });
    }

    diagnostics
}

/// Check a parsed config for values that load but cannot work.
pub fn validate_semantics(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.provision.program.trim().is_empty() {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: "provision.program".to_string(),
            message: "Package manager program must not be empty".to_string(),
        });
    }

    let convention = &config.database.convention;
    if convention.canonical_prefix == convention.friendly_prefix {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Warn,
            path: "database.convention".to_string(),
            message: "Canonical and friendly prefixes are identical; host expansion yields half the candidates".to_string(),
        });
    }
    if convention.direct_domain == convention.tunnel_domain {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Warn,
            path: "database.convention".to_string(),
            message: "Direct and tunnel domains are identical; host expansion yields half the candidates".to_string(),
        });
    }
    if config.database.probe_query.trim().is_empty() {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: "database.probe_query".to_string(),
            message: "A round-trip query is required to confirm a connection".to_string(),
        });
    }

    diagnostics
}
