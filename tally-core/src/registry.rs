use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::service::TenantService;
use crate::tenant::{OrgSlug, TenantConnection};

/// A feature of the application (members, contributions, ...).
///
/// Modules are registered up front but their services are constructed only
/// once a tenant is ready, from the active connection. The connection
/// arrives as a constructor argument - a module never reads it from shared
/// state.
pub trait FeatureModule: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, conn: &TenantConnection) -> Result<Arc<dyn TenantService>>;
}

/// Named services for the currently active tenant.
///
/// Rebuilt on every tenant switch and emptied when the tenant is cleared,
/// so a stale service can never serve a record from the wrong tenant.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<&'static str, Arc<dyn TenantService>>,
    active: Option<OrgSlug>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            active: None,
        }
    }

    /// Construct every module's service against `conn`, replacing whatever
    /// the previous tenant had registered.
    pub fn rebuild(
        &mut self,
        modules: &[Arc<dyn FeatureModule>],
        conn: &TenantConnection,
    ) -> Result<()> {
        let mut services = HashMap::with_capacity(modules.len());
        for module in modules {
            services.insert(module.name(), module.build(conn)?);
        }
        self.services = services;
        self.active = Some(conn.slug.clone());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.services.clear();
        self.active = None;
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TenantService>> {
        self.services.get(name).cloned()
    }

    pub fn active_slug(&self) -> Option<&OrgSlug> {
        self.active.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
