use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tally_core::errors::TallyError;
use tally_core::provision::ConnectionProvisioner;
use tally_core::tenant::{OrgSlug, OrganizationRecord, TenantConnection};

/// Registry of live per-tenant connections, one per slug.
///
/// The registry is a map, not a list: a second acquire for a slug that is
/// already live returns the registered connection unchanged. The lock is
/// held across provisioning, so two racing acquires for the same slug can
/// never both reach the provisioner.
pub struct ConnectionPool {
    provisioner: Arc<dyn ConnectionProvisioner>,
    live: Mutex<HashMap<OrgSlug, TenantConnection>>,
}

impl ConnectionPool {
    pub fn new(provisioner: Arc<dyn ConnectionProvisioner>) -> Self {
        Self {
            provisioner,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live connection for `org`, provisioning one if needed.
    ///
    /// Idempotent: an existing connection is returned as-is, without
    /// touching the provisioner. Fails with a `Config` error when the
    /// record carries no usable connection config.
    pub async fn acquire(&self, org: &OrganizationRecord) -> Result<TenantConnection> {
        if !org.connection_config.is_usable() {
            return Err(TallyError::config(format!(
                "organization {} has no usable connection config",
                org.slug
            ))
            .into_anyhow());
        }

        let mut live = self.live.lock().await;
        if let Some(existing) = live.get(&org.slug) {
            debug!(slug = %org.slug, "reusing live tenant connection");
            return Ok(existing.clone());
        }

        let handle = self.provisioner.provision(org).await?;
        let conn = TenantConnection::new(org.slug.clone(), handle);
        live.insert(org.slug.clone(), conn.clone());
        info!(slug = %org.slug, "provisioned tenant connection");
        Ok(conn)
    }

    /// Tear down the connection registered for `slug`, if any.
    ///
    /// Idempotent: releasing an unregistered slug is a no-op. Teardown
    /// failures are logged and swallowed - the handle is being abandoned
    /// either way.
    pub async fn release(&self, slug: &OrgSlug) {
        let removed = self.live.lock().await.remove(slug);
        let Some(conn) = removed else {
            debug!(%slug, "release of unregistered slug ignored");
            return;
        };

        if let Err(err) = conn.handle.close().await {
            warn!(%slug, %err, "tenant connection teardown failed, abandoning handle");
        } else {
            info!(%slug, "released tenant connection");
        }
    }

    pub async fn is_live(&self, slug: &OrgSlug) -> bool {
        self.live.lock().await.contains_key(slug)
    }

    pub async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }
}
