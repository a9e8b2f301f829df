//! Core multi-tenant types for Tally.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::TallyError;
use crate::store::TenantStore;

/// URL-safe unique identifier for a tenant organization.
///
/// Immutable once a record exists under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgSlug(pub String);

impl OrgSlug {
    /// Parse a candidate slug, enforcing the URL-safe charset.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if raw.is_empty() {
            return Err(TallyError::bad_request("organization slug is empty").into_anyhow());
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(
                TallyError::bad_request(format!("invalid organization slug: {raw}")).into_anyhow(),
            );
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque credential/config bundle for a tenant's backing store.
///
/// Treated as a capability token: the core never inspects its shape, it only
/// checks that one is present before handing it to a provisioner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionConfig(pub serde_json::Value);

impl ConnectionConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// A record is only usable when it carries a non-empty config object.
    pub fn is_usable(&self) -> bool {
        self.0.as_object().map(|m| !m.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgStatus {
    Active,
    Disabled,
}

impl Default for OrgStatus {
    fn default() -> Self {
        OrgStatus::Active
    }
}

/// One organization in the central directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub slug: OrgSlug,
    pub name: String,
    /// Capability token for the tenant's own database. Never serialized out
    /// to clients.
    #[serde(skip_serializing, default)]
    pub connection_config: ConnectionConfig,
    #[serde(default)]
    pub status: OrgStatus,
}

impl OrganizationRecord {
    pub fn new(slug: OrgSlug, name: impl Into<String>, connection_config: ConnectionConfig) -> Self {
        Self {
            slug,
            name: name.into(),
            connection_config,
            status: OrgStatus::Active,
        }
    }
}

/// Context carried with every tenant-scoped operation.
///
/// Passed into services explicitly so all record logic is tenant-aware
/// without any ambient lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub slug: OrgSlug,
}

impl TenantContext {
    pub fn new(slug: OrgSlug) -> Self {
        Self { slug }
    }
}

/// A live per-tenant connection.
///
/// Owned by the connection pool; everything else holds non-owning clones.
/// The handle is shared by all consumers while the tenant is current.
#[derive(Clone)]
pub struct TenantConnection {
    pub slug: OrgSlug,
    pub handle: Arc<dyn TenantStore>,
}

impl TenantConnection {
    pub fn new(slug: OrgSlug, handle: Arc<dyn TenantStore>) -> Self {
        Self { slug, handle }
    }

    /// Whether two values refer to the same live handle.
    pub fn same_handle(&self, other: &TenantConnection) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for TenantConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConnection")
            .field("slug", &self.slug)
            .finish_non_exhaustive()
    }
}
