//! In-memory reference adapters.
//!
//! Back the dev backend and the test suites: a directory, a provisioner and
//! a per-tenant store that live entirely in process memory. The provisioner
//! and store share a journal so lifecycle ordering (provision, close, event
//! delivery) can be asserted from the outside.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::directory::CentralDirectory;
use crate::errors::TallyError;
use crate::provision::ConnectionProvisioner;
use crate::store::TenantStore;
use crate::tenant::{OrgSlug, OrganizationRecord};

/// Shared append-only log of lifecycle steps, for assertions.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(journal: &Journal, entry: String) {
    if let Ok(mut log) = journal.lock() {
        log.push(entry);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Per-tenant in-memory record store.
pub struct MemoryStore {
    slug: OrgSlug,
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    closed: AtomicBool,
    fail_close: AtomicBool,
    journal: Journal,
}

impl MemoryStore {
    pub fn new(slug: OrgSlug, journal: Journal) -> Self {
        Self {
            slug,
            collections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            journal,
        }
    }

    /// Make `close` report a teardown failure (the handle still ends up
    /// closed - the pool abandons it regardless).
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Bring a torn-down handle back into service. The provisioner calls
    /// this when a released tenant is re-requested: the connection is
    /// replaced, the tenant's records are not.
    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TallyError::transient_io(format!(
                "connection for {} is closed",
                self.slug
            ))
            .into_anyhow());
        }
        Ok(())
    }

    fn not_found(&self, collection: &str, id: &str) -> anyhow::Error {
        TallyError::not_found(format!("{collection} record not found: {id}")).into_anyhow()
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value> {
        self.ensure_open()?;

        let mut obj = record.as_object().cloned().unwrap_or_default();
        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{collection}:{}", Uuid::new_v4()));
        obj.insert("id".to_string(), Value::String(id.clone()));
        let value = Value::Object(obj);

        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, value.clone());

        Ok(value)
    }

    async fn find(&self, collection: &str) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        let map = collections.get(collection);
        Ok(map.into_iter().flat_map(|m| m.values()).cloned().collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|m| m.get(id))
            .cloned()
            .ok_or_else(|| self.not_found(collection, id))
    }

    async fn patch(&self, collection: &str, id: &str, changes: Value) -> Result<Value> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let map = collections
            .get_mut(collection)
            .ok_or_else(|| self.not_found(collection, id))?;
        let existing = map.get(id).ok_or_else(|| self.not_found(collection, id))?;

        let mut record = existing.as_object().cloned().unwrap_or_default();
        if let Some(patch) = changes.as_object() {
            for (k, v) in patch {
                if k == "id" {
                    continue;
                }
                record.insert(k.clone(), v.clone());
            }
        }
        let value = Value::Object(record);
        map.insert(id.to_string(), value.clone());
        Ok(value)
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<Value> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        collections
            .get_mut(collection)
            .and_then(|m| m.remove(id))
            .ok_or_else(|| self.not_found(collection, id))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        push(&self.journal, format!("close:{}", self.slug));
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TallyError::transient_io(format!(
                "teardown failed for {}",
                self.slug
            ))
            .into_anyhow());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

/// Provisioner producing [`MemoryStore`] handles.
///
/// Counts provisions and can be told to fail for specific slugs, so tests
/// can assert idempotence and error propagation.
pub struct MemoryProvisioner {
    journal: Journal,
    provisions: AtomicUsize,
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    failing: Mutex<HashSet<String>>,
    failing_close: Mutex<HashSet<String>>,
}

impl MemoryProvisioner {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            provisions: AtomicUsize::new(0),
            stores: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            failing_close: Mutex::new(HashSet::new()),
        }
    }

    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    /// Make every future provision for `slug` fail with a transient error.
    pub fn fail_for(&self, slug: &OrgSlug) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(slug.to_string());
        }
    }

    /// Make handles provisioned for `slug` fail their teardown.
    pub fn fail_close_for(&self, slug: &OrgSlug) {
        if let Ok(mut failing) = self.failing_close.lock() {
            failing.insert(slug.to_string());
        }
    }
}

#[async_trait]
impl ConnectionProvisioner for MemoryProvisioner {
    async fn provision(&self, org: &OrganizationRecord) -> Result<Arc<dyn TenantStore>> {
        let should_fail = self
            .failing
            .lock()
            .map(|f| f.contains(org.slug.as_str()))
            .unwrap_or(false);
        if should_fail {
            return Err(TallyError::transient_io(format!(
                "backend unavailable while provisioning {}",
                org.slug
            ))
            .into_anyhow());
        }

        self.provisions.fetch_add(1, Ordering::SeqCst);
        push(&self.journal, format!("provision:{}", org.slug));

        // Records survive reconnection: a re-requested tenant gets its
        // existing store back, reopened.
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| TallyError::general("memory store registry poisoned").into_anyhow())?;
        let store = stores
            .entry(org.slug.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryStore::new(org.slug.clone(), self.journal.clone()))
            })
            .clone();
        store.reopen();

        let close_fails = self
            .failing_close
            .lock()
            .map(|f| f.contains(org.slug.as_str()))
            .unwrap_or(false);
        if close_fails {
            store.fail_close();
        }
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// In-memory central directory.
#[derive(Default)]
pub struct MemoryDirectory {
    organizations: RwLock<HashMap<String, OrganizationRecord>>,
    memberships: RwLock<HashMap<String, BTreeSet<String>>>,
    denied: RwLock<HashSet<String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, record: OrganizationRecord) {
        let mut organizations = self.organizations.write().await;
        organizations.insert(record.slug.to_string(), record);
    }

    /// Simulate the backing store denying reads of `slug`.
    pub async fn deny_reads(&self, slug: &OrgSlug) {
        self.denied.write().await.insert(slug.to_string());
    }
}

#[async_trait]
impl CentralDirectory for MemoryDirectory {
    async fn get_organization(&self, slug: &OrgSlug) -> Result<OrganizationRecord> {
        if self.denied.read().await.contains(slug.as_str()) {
            return Err(
                TallyError::access(format!("read denied for organization: {slug}")).into_anyhow(),
            );
        }
        self.organizations
            .read()
            .await
            .get(slug.as_str())
            .cloned()
            .ok_or_else(|| {
                TallyError::not_found(format!("organization not found: {slug}")).into_anyhow()
            })
    }

    async fn membership(&self, user_id: &str) -> Result<Vec<OrgSlug>> {
        let memberships = self.memberships.read().await;
        Ok(memberships
            .get(user_id)
            .into_iter()
            .flatten()
            .map(|s| OrgSlug(s.clone()))
            .collect())
    }

    async fn all_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        Ok(self.organizations.read().await.values().cloned().collect())
    }

    async fn upsert_organization(&self, record: OrganizationRecord) -> Result<()> {
        self.seed(record).await;
        Ok(())
    }

    async fn grant(&self, user_id: &str, slug: &OrgSlug) -> Result<()> {
        let mut memberships = self.memberships.write().await;
        memberships
            .entry(user_id.to_string())
            .or_default()
            .insert(slug.to_string());
        Ok(())
    }

    async fn revoke(&self, user_id: &str, slug: &OrgSlug) -> Result<()> {
        let mut memberships = self.memberships.write().await;
        if let Some(set) = memberships.get_mut(user_id) {
            set.remove(slug.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tenant::ConnectionConfig;

    fn org(slug: &str) -> OrganizationRecord {
        OrganizationRecord::new(
            OrgSlug::parse(slug).unwrap(),
            slug.to_uppercase(),
            ConnectionConfig::new(json!({"backend": "memory"})),
        )
    }

    #[tokio::test]
    async fn store_round_trips_records() {
        let store = MemoryStore::new(OrgSlug::parse("acme").unwrap(), journal());

        let created = store
            .insert("members", json!({"name": "Ada"}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let patched = store
            .patch("members", &id, json!({"role": "treasurer", "id": "ignored"}))
            .await
            .unwrap();
        assert_eq!(patched["id"], id.as_str());
        assert_eq!(patched["role"], "treasurer");

        let removed = store.remove("members", &id).await.unwrap();
        assert_eq!(removed["name"], "Ada");
        assert!(store.get("members", &id).await.is_err());
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new(OrgSlug::parse("acme").unwrap(), journal());
        store.close().await.unwrap();

        let err = store.find("members").await.unwrap_err();
        assert_eq!(
            TallyError::from_anyhow(&err).map(|e| e.kind),
            Some(crate::errors::ErrorKind::TransientIo)
        );
    }

    #[tokio::test]
    async fn membership_listing_skips_stale_slugs() {
        let directory = MemoryDirectory::new();
        directory.seed(org("acme")).await;
        directory
            .grant("user-1", &OrgSlug::parse("acme").unwrap())
            .await
            .unwrap();
        directory
            .grant("user-1", &OrgSlug::parse("ghost").unwrap())
            .await
            .unwrap();

        let records = directory.organizations_for_user("user-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slug.as_str(), "acme");
    }

    #[tokio::test]
    async fn denied_reads_surface_as_access_errors() {
        let directory = MemoryDirectory::new();
        directory.seed(org("secret")).await;
        let slug = OrgSlug::parse("secret").unwrap();
        directory.deny_reads(&slug).await;

        let err = directory.get_organization(&slug).await.unwrap_err();
        assert_eq!(
            TallyError::from_anyhow(&err).map(|e| e.kind),
            Some(crate::errors::ErrorKind::Access)
        );
    }
}
