//! Central directory of organizations and user memberships.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::tenant::{OrgSlug, OrganizationRecord};

/// Shared store of organization records and user-to-organization
/// memberships, keyed by slug.
///
/// No caching happens at this layer; every call may hit the backing store.
/// Ordering of listings is unspecified here - callers sort by `name` when a
/// stable display order is needed.
#[async_trait]
pub trait CentralDirectory: Send + Sync {
    /// Fetch the record for `slug`.
    ///
    /// `NotFound` when no record exists; `Access` when the backing store
    /// denies the read (propagated unchanged).
    async fn get_organization(&self, slug: &OrgSlug) -> Result<OrganizationRecord>;

    /// The set of organization slugs `user_id` may access. Empty when the
    /// user has no memberships.
    async fn membership(&self, user_id: &str) -> Result<Vec<OrgSlug>>;

    /// Administrative full listing.
    async fn all_organizations(&self) -> Result<Vec<OrganizationRecord>>;

    /// Create or replace an organization record. The slug is the key and is
    /// immutable: an upsert never renames.
    async fn upsert_organization(&self, record: OrganizationRecord) -> Result<()>;

    /// Grant `user_id` access to `slug`. Granting twice is a no-op.
    async fn grant(&self, user_id: &str, slug: &OrgSlug) -> Result<()>;

    /// Revoke `user_id`'s access to `slug`. Revoking an absent grant is a
    /// no-op.
    async fn revoke(&self, user_id: &str, slug: &OrgSlug) -> Result<()>;

    /// Resolve the membership set for `user_id`, then fetch each referenced
    /// record.
    ///
    /// A slug whose record is missing is a stale membership reference: it is
    /// skipped with a warning, never an error.
    async fn organizations_for_user(&self, user_id: &str) -> Result<Vec<OrganizationRecord>> {
        use crate::errors::{ErrorKind, TallyError};

        let slugs = self.membership(user_id).await?;
        let mut records = Vec::with_capacity(slugs.len());
        for slug in slugs {
            match self.get_organization(&slug).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    // Missing or unreadable records are stale references;
                    // real backend failures still propagate.
                    match TallyError::from_anyhow(&err).map(|e| e.kind) {
                        Some(ErrorKind::NotFound) | Some(ErrorKind::Access) => {
                            warn!(user_id, %slug, %err, "skipping stale membership reference");
                        }
                        _ => return Err(err),
                    }
                }
            }
        }
        Ok(records)
    }
}
