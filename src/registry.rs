//! Compiled-in service catalog.
//!
//! Each [`ServiceDescriptor`] names one loadable service: where its source
//! lives, which host dependencies must be struck before it loads, and an
//! optional hook run right before its entry points execute. The table is
//! static and never changes after start-up.

use once_cell::sync::Lazy;
use std::fmt;

use crate::error::{GraftError, Result};
use crate::isolate::HostRuntime;

/// Shared low-level libraries both the host and every service carry.
pub const DEFAULT_ISOLATED: &[&str] = &[
    "timeout",
    "ffi",
    "json",
    "date",
    "bigdecimal",
    "mime-types",
    "mime-types-data",
];

const GIT_BASE: &str = "git@gitlab.com:norwex/rosi/services";

/// Preparation step run after provisioning, right before the entry points
/// load. It receives the host runtime so it can isolate further by hand.
pub type PreLoadHook = fn(&mut dyn HostRuntime);

/// Identity of a loadable service.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    /// Repository URL cloned into the workspace.
    pub repository: String,
    /// Dependencies force-isolated right before the service loads.
    pub isolate: Vec<String>,
    pub before_load: Option<PreLoadHook>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("repository", &self.repository)
            .field("isolate", &self.isolate)
            .field("before_load", &self.before_load.is_some())
            .finish()
    }
}

impl ServiceDescriptor {
    /// Descriptor with the default isolate list and no hook.
    pub fn new(name: &'static str, repository: impl Into<String>) -> Self {
        Self {
            name,
            repository: repository.into(),
            isolate: DEFAULT_ISOLATED.iter().map(|s| s.to_string()).collect(),
            before_load: None,
        }
    }

    pub fn with_isolate(mut self, isolate: &[&str]) -> Self {
        self.isolate = isolate.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_hook(mut self, hook: PreLoadHook) -> Self {
        self.before_load = Some(hook);
        self
    }

    /// Checkout directory name: last path segment of the repository URL,
    /// cut at its first `.`.
    pub fn checkout_dir(&self) -> String {
        repository_dir_name(&self.repository)
    }
}

/// `git@host:org/rosi_cart_service.git` → `rosi_cart_service`.
pub fn repository_dir_name(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(url);
    last.split('.').next().unwrap_or(last).to_string()
}

fn service(name: &'static str, repo: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(name, format!("{}/{}.git", GIT_BASE, repo))
}

static CATALOG: Lazy<Vec<ServiceDescriptor>> = Lazy::new(|| {
    vec![
        service("user", "rosi_user_service"),
        service("catalog", "rosi_catalog_service"),
        service("mybusiness", "rosi_my_business_service"),
        service("cart", "rosi_cart_service"),
        service("inventory", "rosi_inventory_service"),
        service("oms", "rosi_oms_service"),
        service("payment", "rosi_payment_management_service"),
        service("rewards", "rosi_rewards_service"),
        service("tax", "rosi_tax_service"),
        service("virtual", "rosi_virtual_fulfillment_service"),
        service("email", "rosi_email_service"),
        service("ugc", "rosi_ugc_service"),
        service("credits", "rosi_credits_service"),
        service("subscription", "rosi_subscription_service"),
        service("notification", "rosi_notification_service"),
    ]
});

/// A set of descriptors looked up by name, in declaration order.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
    /// The compiled-in catalog.
    pub fn builtin() -> Self {
        Self {
            services: CATALOG.clone(),
        }
    }

    /// A custom table, mainly for tests and embedding hosts.
    pub fn from_services(services: Vec<ServiceDescriptor>) -> Self {
        Self { services }
    }

    /// Service names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.name == name)
    }

    /// Look up a service; unknown names list the valid set.
    pub fn lookup(&self, name: &str) -> Result<&ServiceDescriptor> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| GraftError::ServiceNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Names of the compiled-in services, in declaration order.
pub fn list_services() -> Vec<String> {
    ServiceRegistry::builtin().names()
}
