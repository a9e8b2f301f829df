use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use typedb_driver::TypeDBDriver;
use uuid::Uuid;

use tally_core::errors::TallyError;
use tally_core::store::TenantStore;

use crate::query::{execute_query, quote, QueryKind};

/// Schema applied to every tenant database: records are JSON documents
/// stored under (collection, record-id).
pub const RECORD_SCHEMA: &str = "define\n\
    attribute collection value string;\n\
    attribute record-id value string;\n\
    attribute payload value string;\n\
    entity record, owns collection, owns record-id, owns payload;";

pub fn insert_query(collection: &str, id: &str, payload: &str) -> String {
    format!(
        "insert $r isa record, has collection {}, has record-id {}, has payload {};",
        quote(collection),
        quote(id),
        quote(payload)
    )
}

pub fn find_query(collection: &str) -> String {
    format!(
        "match $r isa record, has collection {}, has payload $payload; select $payload;",
        quote(collection)
    )
}

pub fn get_query(collection: &str, id: &str) -> String {
    format!(
        "match $r isa record, has collection {}, has record-id {}, has payload $payload; select $payload;",
        quote(collection),
        quote(id)
    )
}

pub fn replace_payload_query(collection: &str, id: &str, payload: &str) -> String {
    format!(
        "match $r isa record, has collection {}, has record-id {}, has payload $old; \
         delete $old of $r; \
         insert $r has payload {};",
        quote(collection),
        quote(id),
        quote(payload)
    )
}

pub fn delete_query(collection: &str, id: &str) -> String {
    format!(
        "match $r isa record, has collection {}, has record-id {}; delete $r;",
        quote(collection),
        quote(id)
    )
}

/// Per-tenant record store over one TypeDB database.
pub struct TypeDbStore {
    driver: Arc<TypeDBDriver>,
    database: String,
}

impl TypeDbStore {
    pub fn new(driver: Arc<TypeDBDriver>, database: impl Into<String>) -> Self {
        Self {
            driver,
            database: database.into(),
        }
    }

    fn not_found(collection: &str, id: &str) -> anyhow::Error {
        TallyError::not_found(format!("{collection} record not found: {id}")).into_anyhow()
    }

    fn parse_payload(row: &Value) -> Result<Value> {
        let raw = row
            .get("payload")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("answer row carried no payload column"))?;
        serde_json::from_str(raw).map_err(|e| anyhow!("stored payload is not valid JSON: {}", e))
    }
}

#[async_trait]
impl TenantStore for TypeDbStore {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value> {
        let mut obj = record.as_object().cloned().unwrap_or_default();
        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{collection}:{}", Uuid::new_v4()));
        obj.insert("id".to_string(), Value::String(id.clone()));
        let value = Value::Object(obj);

        let payload = serde_json::to_string(&value)?;
        execute_query(
            &self.driver,
            &self.database,
            &insert_query(collection, &id, &payload),
            QueryKind::Write,
        )
        .await?;

        Ok(value)
    }

    async fn find(&self, collection: &str) -> Result<Vec<Value>> {
        let rows = execute_query(
            &self.driver,
            &self.database,
            &find_query(collection),
            QueryKind::Read,
        )
        .await?;

        rows.iter().map(Self::parse_payload).collect()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value> {
        let rows = execute_query(
            &self.driver,
            &self.database,
            &get_query(collection, id),
            QueryKind::Read,
        )
        .await?;

        let row = rows
            .first()
            .ok_or_else(|| Self::not_found(collection, id))?;
        Self::parse_payload(row)
    }

    async fn patch(&self, collection: &str, id: &str, changes: Value) -> Result<Value> {
        let existing = self.get(collection, id).await?;

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

        let payload = serde_json::to_string(&value)?;
        execute_query(
            &self.driver,
            &self.database,
            &replace_payload_query(collection, id, &payload),
            QueryKind::Write,
        )
        .await?;

        Ok(value)
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<Value> {
        let existing = self.get(collection, id).await?;

        execute_query(
            &self.driver,
            &self.database,
            &delete_query(collection, id),
            QueryKind::Write,
        )
        .await?;

        Ok(existing)
    }

    async fn close(&self) -> Result<()> {
        self.driver
            .force_close()
            .map_err(|e| anyhow!("Failed to close tenant driver: {}", e))
    }
}
