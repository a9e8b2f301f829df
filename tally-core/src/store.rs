//! Per-tenant record store surface.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The minimal record surface a live tenant handle exposes.
///
/// Records are JSON documents grouped into named collections. Fetch-by-id
/// has record-or-absent semantics: a missing record is a `NotFound` error,
/// never a silent null.
///
/// Implementations are the opaque handle behind a `TenantConnection`; the
/// pool calls `close` when the connection is torn down.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Store a new record. The record must already carry its `id` field.
    async fn insert(&self, collection: &str, record: Value) -> Result<Value>;

    /// List all records in a collection.
    async fn find(&self, collection: &str) -> Result<Vec<Value>>;

    /// Fetch one record by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Value>;

    /// Merge `changes` into an existing record (the `id` field is kept).
    async fn patch(&self, collection: &str, id: &str, changes: Value) -> Result<Value>;

    /// Delete one record by id, returning the removed record.
    async fn remove(&self, collection: &str, id: &str) -> Result<Value>;

    /// Dispose of the underlying live handle. Called exactly once per
    /// connection, by the pool, when the tenant is released.
    async fn close(&self) -> Result<()>;
}
