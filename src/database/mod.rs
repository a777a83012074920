//! Database host resolution for a loaded service.
//!
//! A caller-supplied override is normalized, merged over the service's own
//! base spec, expanded into host candidates by the naming convention, and
//! tried in order until one connection answers the probe query.

mod connector;
mod hosts;
mod resolver;
mod spec;
mod yaml;

pub use connector::{Connector, DatabaseConnection, MockConnector, MockEvent, SqlxConnector};
pub use hosts::{ConventionHost, HostConvention};
pub use resolver::{ActiveConnection, DatabaseResolver};
pub use spec::{mask_url, normalize, normalize_key, url_scheme, ConnectionSpec, REQUIRED_KEYS};
pub use yaml::{parse_base_spec, read_base_spec, substitute_env};
