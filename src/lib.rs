//! graft - load remote services into a running host and wire up their database
//!
//! A named service is cloned into a disposable workspace, its dependencies are
//! installed into a workspace-private directory, conflicting host dependencies
//! are isolated, and its entry points are run inside the host runtime. Its
//! database connection is then negotiated by probing host-name candidates
//! derived from a naming convention.

pub mod config;
pub mod database;
pub mod error;
pub mod fetch;
pub mod isolate;
pub mod loader;
pub mod process;
pub mod provision;
pub mod registry;
pub mod utils;

pub use config::Config;
pub use database::{ActiveConnection, ConnectionSpec, DatabaseResolver, HostConvention};
pub use error::{GraftError, Result};
pub use isolate::{HostRuntime, ModuleTable, NativeRuntime};
pub use loader::{LoadedServiceHandle, ServiceManager, StageOutcome};
pub use registry::{list_services, ServiceDescriptor, ServiceRegistry};
