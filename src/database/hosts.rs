//! Host-name convention and candidate expansion.
//!
//! Database hosts follow `<prefix>.<env-id>.<domain>`: the prefix is the
//! canonical or friendly name, the domain is direct or tunnel-qualified. Any
//! one of the four forms expands to all four for the same env-id.

use std::net::IpAddr;

use crate::config::HostConventionConfig;

/// A host name recognised as one of the four convention forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionHost {
    pub prefix: String,
    pub env_id: String,
    pub tunnel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConvention {
    canonical: String,
    friendly: String,
    direct: String,
    tunnel: String,
}

impl Default for HostConvention {
    fn default() -> Self {
        Self::from(&HostConventionConfig::default())
    }
}

impl From<&HostConventionConfig> for HostConvention {
    fn from(config: &HostConventionConfig) -> Self {
        Self {
            canonical: config.canonical_prefix.clone(),
            friendly: config.friendly_prefix.clone(),
            direct: config.direct_domain.clone(),
            tunnel: config.tunnel_domain.clone(),
        }
    }
}

impl HostConvention {
    /// Recognise a convention host. The tunnel domain is tried first since
    /// it usually ends with the direct one.
    pub fn parse(&self, host: &str) -> Option<ConventionHost> {
        [(&self.tunnel, true), (&self.direct, false)]
            .into_iter()
            .find_map(|(domain, tunnel)| {
                let head = host.strip_suffix(domain.as_str())?.strip_suffix('.')?;
                let (prefix, env_id) = head.split_once('.')?;
                let known = prefix == self.canonical || prefix == self.friendly;
                (known && !env_id.is_empty() && !env_id.contains('.')).then(|| ConventionHost {
                    prefix: prefix.to_string(),
                    env_id: env_id.to_string(),
                    tunnel,
                })
            })
    }

    pub fn tunnel_domain(&self) -> &str {
        &self.tunnel
    }

    /// The four convention forms for one env-id, tunnel forms first.
    pub fn forms(&self, env_id: &str) -> Vec<String> {
        [
            (&self.canonical, &self.tunnel),
            (&self.friendly, &self.tunnel),
            (&self.canonical, &self.direct),
            (&self.friendly, &self.direct),
        ]
        .iter()
        .map(|(prefix, domain)| format!("{}.{}.{}", prefix, env_id, domain))
        .collect()
    }

    /// Candidate hosts for `host`, in attempt order and without duplicates.
    ///
    /// - URLs and IP literals: the value itself, untouched.
    /// - A bare label: exactly `<canonical>.<label>.<tunnel>`.
    /// - A convention host: itself first, then the other three forms.
    /// - Anything else: the value itself.
    pub fn expand(&self, host: &str) -> Vec<String> {
        let host = host.trim();
        if host.is_empty() {
            return Vec::new();
        }
        if host.contains("://") || is_ip_literal(host) {
            return vec![host.to_string()];
        }
        if !host.contains('.') {
            return vec![format!("{}.{}.{}", self.canonical, host, self.tunnel)];
        }
        match self.parse(host) {
            Some(parsed) => {
                let mut out = vec![host.to_string()];
                for form in self.forms(&parsed.env_id) {
                    if !out.contains(&form) {
                        out.push(form);
                    }
                }
                out
            }
            None => vec![host.to_string()],
        }
    }
}

fn is_ip_literal(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}
