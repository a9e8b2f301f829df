//! Tally: multi-tenant contribution management.
//!
//! Organizations are resolved by URL slug from a central directory; each
//! gets its own isolated database connection, provisioned on first use and
//! switched as navigation moves between organizations. The feature modules
//! (members, contributions, expenses) are rebuilt against the active
//! tenant's connection on every switch.

mod backend;
pub mod config;
pub mod modules;

use std::sync::{Arc, RwLock};

use anyhow::Result;
use axum::routing::get;

use tally_axum::TenantRouter;
use tally_core::config::AppConfig;
use tally_core::directory::CentralDirectory;
use tally_core::provision::ConnectionProvisioner;
use tally_core::registry::ServiceRegistry;
use tally_tenant::TenantManager;

/// Build the application for the given configuration.
pub async fn build(config: AppConfig) -> Result<TenantRouter> {
    let snapshot = config.snapshot();
    let (directory, provisioner) = backend::select(&snapshot).await?;
    Ok(assemble(directory, provisioner))
}

/// Wire directory + provisioner into a servable router. The manager is the
/// single owner of tenant state; the registry follows its events.
pub fn assemble(
    directory: Arc<dyn CentralDirectory>,
    provisioner: Arc<dyn ConnectionProvisioner>,
) -> TenantRouter {
    let manager = Arc::new(TenantManager::new(directory, provisioner));
    let registry = Arc::new(RwLock::new(ServiceRegistry::new()));
    manager.bind_registry(registry.clone(), modules::default_modules());

    TenantRouter::new(manager, registry).route("/health", get(|| async { "ok" }))
}
