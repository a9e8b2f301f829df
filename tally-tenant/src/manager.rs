use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info};

use tally_core::directory::CentralDirectory;
use tally_core::events::{
    EventListener, ListenerId, TenantEvent, TenantEventHub, TenantEventKind, TenantEventPattern,
};
use tally_core::provision::ConnectionProvisioner;
use tally_core::registry::{FeatureModule, ServiceRegistry};
use tally_core::tenant::{OrgSlug, OrganizationRecord, TenantConnection};

use crate::pool::ConnectionPool;

struct ActiveTenant {
    org: OrganizationRecord,
    connection: TenantConnection,
}

/// A navigation token. Obtained before the directory fetch so that a
/// superseded navigation's late activate can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation(u64);

/// The single owner of "which organization is current".
///
/// All mutation of the current organization and of the connection registry
/// funnels through `activate`/`clear`, which share one async mutex: two
/// overlapping switches serialize instead of interleaving, so the outgoing
/// tenant's connection is always released before readiness is published for
/// the incoming one. Everything else derives tenant identity from the reads
/// here.
pub struct TenantManager {
    directory: Arc<dyn CentralDirectory>,
    pool: ConnectionPool,
    current: RwLock<Option<ActiveTenant>>,
    events: RwLock<TenantEventHub>,
    switch: Mutex<()>,
    generation: AtomicU64,
}

impl TenantManager {
    pub fn new(
        directory: Arc<dyn CentralDirectory>,
        provisioner: Arc<dyn ConnectionProvisioner>,
    ) -> Self {
        Self {
            directory,
            pool: ConnectionPool::new(provisioner),
            current: RwLock::new(None),
            events: RwLock::new(TenantEventHub::new()),
            switch: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Arc<dyn CentralDirectory> {
        &self.directory
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Fetch the organization record for `slug` from the central directory.
    ///
    /// Errors (`NotFound`, `Access`, ...) propagate unchanged; the caller
    /// decides what a failed load means for its surface.
    pub async fn load_organization(&self, slug: &OrgSlug) -> Result<OrganizationRecord> {
        self.directory.get_organization(slug).await
    }

    /// Start a navigation. Any navigation begun earlier is superseded from
    /// this point on: its late `activate_for` will be dropped.
    pub fn begin_navigation(&self) -> Navigation {
        Navigation(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Make `org` the current organization.
    ///
    /// Counts as the newest navigation. If a different organization was
    /// active, its connection is released strictly before `Ready` fires for
    /// the new one. Re-activating the current organization keeps the live
    /// connection and still re-publishes `Ready`, so late-mounted consumers
    /// can rely on re-invocation.
    pub async fn activate(&self, org: OrganizationRecord) -> Result<TenantConnection> {
        let _guard = self.switch.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.switch_locked(org).await
    }

    /// Like [`activate`], but on behalf of the navigation `nav`.
    ///
    /// Returns `Ok(None)` without touching any state when a newer
    /// navigation has started since `nav` was begun - the late response is
    /// ignored rather than racing the newer switch. The in-flight I/O that
    /// produced `org` is not cancelled, only its result is dropped.
    ///
    /// [`activate`]: TenantManager::activate
    pub async fn activate_for(
        &self,
        nav: Navigation,
        org: OrganizationRecord,
    ) -> Result<Option<TenantConnection>> {
        let _guard = self.switch.lock().await;
        if self.generation.load(Ordering::SeqCst) > nav.0 {
            debug!(slug = %org.slug, "dropping superseded navigation");
            return Ok(None);
        }
        self.switch_locked(org).await.map(Some)
    }

    async fn switch_locked(&self, org: OrganizationRecord) -> Result<TenantConnection> {
        let same_org = {
            let current = self.current.read().unwrap();
            current.as_ref().map(|a| &a.org.slug) == Some(&org.slug)
        };

        if !same_org {
            // Release the outgoing tenant before anything is published for
            // the incoming one. No state exposes both as current.
            let outgoing = self.current.write().unwrap().take();
            if let Some(active) = outgoing {
                self.pool.release(&active.org.slug).await;
            }
        }

        match self.pool.acquire(&org).await {
            Ok(connection) => {
                {
                    let mut current = self.current.write().unwrap();
                    *current = Some(ActiveTenant {
                        org: org.clone(),
                        connection: connection.clone(),
                    });
                }
                info!(slug = %org.slug, "tenant ready");
                self.emit(TenantEvent::Ready {
                    org,
                    connection: connection.clone(),
                })
                .await;
                Ok(connection)
            }
            Err(err) => {
                self.emit(TenantEvent::Error {
                    message: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }

    /// Release the current organization's connection and reset to none.
    ///
    /// Publishes `Cleared`. When nothing was ever active this is a silent
    /// no-op: no error, no notification.
    pub async fn clear(&self) {
        let _guard = self.switch.lock().await;
        let previous = self.current.write().unwrap().take();
        let Some(active) = previous else {
            debug!("clear requested with no active organization");
            return;
        };

        self.pool.release(&active.org.slug).await;
        info!(slug = %active.org.slug, "tenant cleared");
        self.emit(TenantEvent::Cleared).await;
    }

    /// Pure read of the current organization.
    pub fn current_org(&self) -> Option<OrganizationRecord> {
        self.current.read().unwrap().as_ref().map(|a| a.org.clone())
    }

    /// Pure read of the published connection.
    pub fn current_connection(&self) -> Option<TenantConnection> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|a| a.connection.clone())
    }

    // ---- events ----

    pub fn on(&self, pattern: TenantEventPattern, listener: EventListener) -> ListenerId {
        self.events.write().unwrap().on(pattern, listener)
    }

    pub fn once(&self, pattern: TenantEventPattern, listener: EventListener) -> ListenerId {
        self.events.write().unwrap().once(pattern, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.write().unwrap().off(id)
    }

    /// Tie a service registry's lifecycle to this manager's events.
    ///
    /// Feature modules are constructed only once a tenant is ready, against
    /// the connection the `Ready` event carries; clearing the tenant empties
    /// the registry. Because listeners are awaited inside the switch, the
    /// registry is already rebuilt by the time `activate` returns.
    pub fn bind_registry(
        &self,
        registry: Arc<RwLock<ServiceRegistry>>,
        modules: Vec<Arc<dyn FeatureModule>>,
    ) {
        let modules = Arc::new(modules);

        let on_ready: EventListener = {
            let registry = registry.clone();
            Arc::new(move |event: &TenantEvent| {
                let registry = registry.clone();
                let modules = modules.clone();
                let connection = match event {
                    TenantEvent::Ready { connection, .. } => Some(connection.clone()),
                    _ => None,
                };
                Box::pin(async move {
                    if let Some(connection) = connection {
                        registry.write().unwrap().rebuild(&modules, &connection)?;
                    }
                    Ok(())
                })
            })
        };
        self.on(TenantEventPattern::Kind(TenantEventKind::Ready), on_ready);

        let on_cleared: EventListener = Arc::new(move |_event: &TenantEvent| {
            let registry = registry.clone();
            Box::pin(async move {
                registry.write().unwrap().clear();
                Ok(())
            })
        });
        self.on(
            TenantEventPattern::Kind(TenantEventKind::Cleared),
            on_cleared,
        );
    }

    async fn emit(&self, event: TenantEvent) {
        // Snapshot under the read lock, await with no lock held, then prune
        // once-listeners under the write lock.
        let (listeners, once_ids) = {
            let hub = self.events.read().unwrap();
            hub.snapshot_emit(&event)
        };

        for listener in &listeners {
            if let Err(err) = listener(&event).await {
                tracing::warn!(%err, "tenant event listener failed");
            }
        }

        if !once_ids.is_empty() {
            self.events.write().unwrap().finalize_once_removals(&once_ids);
        }
    }
}
