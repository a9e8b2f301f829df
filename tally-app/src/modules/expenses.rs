use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use tally_core::errors::TallyError;
use tally_core::registry::FeatureModule;
use tally_core::service::{Params, TenantService};
use tally_core::store::TenantStore;
use tally_core::tenant::{TenantConnection, TenantContext};

const COLLECTION: &str = "expenses";

pub struct ExpensesModule;

impl FeatureModule for ExpensesModule {
    fn name(&self) -> &'static str {
        COLLECTION
    }

    fn build(&self, conn: &TenantConnection) -> Result<Arc<dyn TenantService>> {
        Ok(Arc::new(ExpensesService {
            store: conn.handle.clone(),
        }))
    }
}

/// Budget spend records.
pub struct ExpensesService {
    store: Arc<dyn TenantStore>,
}

#[async_trait]
impl TenantService for ExpensesService {
    async fn find(&self, _ctx: &TenantContext, params: &Params) -> Result<Vec<Value>> {
        let records = self.store.find(COLLECTION).await?;
        let Some(category) = params.get("category") else {
            return Ok(records);
        };
        Ok(records
            .into_iter()
            .filter(|r| r.get("category").and_then(|v| v.as_str()) == Some(category))
            .collect())
    }

    async fn get(&self, _ctx: &TenantContext, id: &str, _params: &Params) -> Result<Value> {
        self.store.get(COLLECTION, id).await
    }

    async fn create(&self, _ctx: &TenantContext, data: Value, _params: &Params) -> Result<Value> {
        let amount_ok = data
            .get("amount")
            .and_then(|v| v.as_f64())
            .map(|a| a > 0.0)
            .unwrap_or(false);
        if !amount_ok {
            return Err(TallyError::unprocessable("Invalid expense")
                .with_errors(json!({"amount": ["must be a positive number"]}))
                .into_anyhow());
        }

        let mut record = data.as_object().cloned().unwrap_or_default();
        record
            .entry("id".to_string())
            .or_insert_with(|| Value::String(format!("expense:{}", Uuid::new_v4())));
        record
            .entry("recorded_at".to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

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
