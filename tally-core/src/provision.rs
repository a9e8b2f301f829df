//! Per-tenant connection provisioning seam.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::store::TenantStore;
use crate::tenant::OrganizationRecord;

/// Turns an organization's opaque connection config into a live handle.
///
/// The pool owns the call site: it validates that a usable config is present
/// before invoking `provision`, registers the returned handle under the
/// slug, and disposes of it via [`TenantStore::close`] on release.
///
/// [`TenantStore::close`]: crate::store::TenantStore::close
#[async_trait]
pub trait ConnectionProvisioner: Send + Sync {
    async fn provision(&self, org: &OrganizationRecord) -> Result<Arc<dyn TenantStore>>;
}
