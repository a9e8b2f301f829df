use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use tally_core::errors::TallyError;
use tally_core::registry::FeatureModule;
use tally_core::service::{Params, TenantService};
use tally_core::store::TenantStore;
use tally_core::tenant::{TenantConnection, TenantContext};

const COLLECTION: &str = "contributions";

pub struct ContributionsModule;

impl FeatureModule for ContributionsModule {
    fn name(&self) -> &'static str {
        COLLECTION
    }

    fn build(&self, conn: &TenantConnection) -> Result<Arc<dyn TenantService>> {
        Ok(Arc::new(ContributionsService {
            store: conn.handle.clone(),
        }))
    }
}

/// Dues payments, one record per member payment.
pub struct ContributionsService {
    store: Arc<dyn TenantStore>,
}

fn validate(data: &Value) -> Option<Value> {
    let mut errors = Map::new();

    let has_member = data
        .get("member_id")
        .and_then(|v| v.as_str())
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    if !has_member {
        errors.insert("member_id".into(), serde_json::json!(["required"]));
    }

    match data.get("amount").and_then(|v| v.as_f64()) {
        Some(amount) if amount > 0.0 => {}
        Some(_) => {
            errors.insert("amount".into(), serde_json::json!(["must be positive"]));
        }
        None => {
            errors.insert("amount".into(), serde_json::json!(["required"]));
        }
    }

    if errors.is_empty() {
        None
    } else {
        Some(Value::Object(errors))
    }
}

#[async_trait]
impl TenantService for ContributionsService {
    async fn find(&self, _ctx: &TenantContext, params: &Params) -> Result<Vec<Value>> {
        let records = self.store.find(COLLECTION).await?;
        let Some(member_id) = params.get("member_id") else {
            return Ok(records);
        };
        Ok(records
            .into_iter()
            .filter(|r| r.get("member_id").and_then(|v| v.as_str()) == Some(member_id))
            .collect())
    }

    async fn get(&self, _ctx: &TenantContext, id: &str, _params: &Params) -> Result<Value> {
        self.store.get(COLLECTION, id).await
    }

    async fn create(&self, _ctx: &TenantContext, data: Value, _params: &Params) -> Result<Value> {
        if let Some(errors) = validate(&data) {
            return Err(TallyError::unprocessable("Invalid contribution")
                .with_errors(errors)
                .into_anyhow());
        }

        let mut record = data.as_object().cloned().unwrap_or_default();
        record
            .entry("id".to_string())
            .or_insert_with(|| Value::String(format!("contribution:{}", Uuid::new_v4())));
        record
            .entry("recorded_at".to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        self.store.insert(COLLECTION, Value::Object(record)).await
    }

    async fn remove(&self, _ctx: &TenantContext, id: &str, _params: &Params) -> Result<Value> {
        self.store.remove(COLLECTION, id).await
    }
}
