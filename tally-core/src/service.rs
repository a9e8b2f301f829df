use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::tenant::TenantContext;

/// Query-string parameters forwarded to service methods.
pub type Params = HashMap<String, String>;

/// A tenant-scoped record service:
///
/// - `find`   → list (optionally filtered by params)
/// - `get`    → fetch one by id
/// - `create` → create one
/// - `patch`  → partial update
/// - `remove` → delete one
///
/// All methods default to "Method not implemented", so a service overrides
/// only what it actually supports. Every call receives the tenant context
/// explicitly; services never look tenant identity up from ambient state.
#[async_trait]
pub trait TenantService: Send + Sync {
    async fn find(&self, _ctx: &TenantContext, _params: &Params) -> Result<Vec<Value>> {
        Err(anyhow!("Method not implemented: find"))
    }

    async fn get(&self, _ctx: &TenantContext, _id: &str, _params: &Params) -> Result<Value> {
        Err(anyhow!("Method not implemented: get"))
    }

    async fn create(&self, _ctx: &TenantContext, _data: Value, _params: &Params) -> Result<Value> {
        Err(anyhow!("Method not implemented: create"))
    }

    async fn patch(
        &self,
        _ctx: &TenantContext,
        _id: &str,
        _data: Value,
        _params: &Params,
    ) -> Result<Value> {
        Err(anyhow!("Method not implemented: patch"))
    }

    async fn remove(&self, _ctx: &TenantContext, _id: &str, _params: &Params) -> Result<Value> {
        Err(anyhow!("Method not implemented: remove"))
    }
}
