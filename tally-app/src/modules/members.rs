use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use tally_core::errors::TallyError;
use tally_core::registry::FeatureModule;
use tally_core::service::{Params, TenantService};
use tally_core::store::TenantStore;
use tally_core::tenant::{TenantConnection, TenantContext};

const COLLECTION: &str = "members";

pub struct MembersModule;

impl FeatureModule for MembersModule {
    fn name(&self) -> &'static str {
        COLLECTION
    }

    fn build(&self, conn: &TenantConnection) -> Result<Arc<dyn TenantService>> {
        Ok(Arc::new(MembersService {
            store: conn.handle.clone(),
        }))
    }
}

/// The organization's roster.
pub struct MembersService {
    store: Arc<dyn TenantStore>,
}

#[async_trait]
impl TenantService for MembersService {
    async fn find(&self, _ctx: &TenantContext, _params: &Params) -> Result<Vec<Value>> {
        self.store.find(COLLECTION).await
    }

    async fn get(&self, _ctx: &TenantContext, id: &str, _params: &Params) -> Result<Value> {
        self.store.get(COLLECTION, id).await
    }

    async fn create(&self, _ctx: &TenantContext, data: Value, _params: &Params) -> Result<Value> {
        let has_name = data
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_name {
            return Err(TallyError::unprocessable("Invalid member")
                .with_errors(json!({"name": ["required"]}))
                .into_anyhow());
        }

        let mut record = data.as_object().cloned().unwrap_or_default();
        record
            .entry("id".to_string())
            .or_insert_with(|| Value::String(format!("member:{}", Uuid::new_v4())));

        self.store.insert(COLLECTION, Value::Object(record)).await
    }

    async fn patch(
        &self,
        _ctx: &TenantContext,
        id: &str,
        data: Value,
        _params: &Params,
    ) -> Result<Value> {
        self.store.patch(COLLECTION, id, data).await
    }

    async fn remove(&self, _ctx: &TenantContext, id: &str, _params: &Params) -> Result<Value> {
        self.store.remove(COLLECTION, id).await
    }
}
