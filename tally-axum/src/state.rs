use std::sync::{Arc, RwLock};

use tally_core::registry::ServiceRegistry;
use tally_tenant::TenantManager;

/// Shared state behind every Tally route: the tenant manager and the
/// per-tenant service registry it rebuilds.
pub struct TenantAppState {
    pub manager: Arc<TenantManager>,
    pub registry: Arc<RwLock<ServiceRegistry>>,
}

impl Clone for TenantAppState {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl TenantAppState {
    pub fn new(manager: Arc<TenantManager>, registry: Arc<RwLock<ServiceRegistry>>) -> Self {
        Self { manager, registry }
    }
}
