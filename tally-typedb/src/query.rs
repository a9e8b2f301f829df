use anyhow::Result;
use futures::StreamExt;
use serde_json::{Map, Value};
use typedb_driver::TypeDBDriver;

#[derive(Debug, Clone, Copy)]
pub enum QueryKind {
    Read,
    Write,
    Schema,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Read => "read",
            QueryKind::Write => "write",
            QueryKind::Schema => "schema",
        }
    }
}

/// Escape a string for embedding in a TypeQL string literal.
pub fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Quote a string as a TypeQL literal.
pub fn quote(raw: &str) -> String {
    format!("\"{}\"", escape(raw))
}

/// Executes a TypeQL query in its own transaction and returns the answer
/// rows as JSON objects (column name to value).
pub async fn execute_query(
    driver: &TypeDBDriver,
    database: &str,
    query: &str,
    kind: QueryKind,
) -> Result<Vec<Value>> {
    match kind {
        QueryKind::Read => execute_read(driver, database, query).await,
        QueryKind::Write => execute_write(driver, database, query).await,
        QueryKind::Schema => execute_schema(driver, database, query).await,
    }
}

async fn execute_read(driver: &TypeDBDriver, database: &str, query: &str) -> Result<Vec<Value>> {
    let transaction = driver
        .transaction(database, typedb_driver::TransactionType::Read)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create read transaction: {}", e))?;

    let answer = transaction
        .query(query)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute read query: {}", e))?;

    // Drain rows while the transaction is alive; it closes when dropped.
    collect_rows(answer).await
}

async fn execute_write(driver: &TypeDBDriver, database: &str, query: &str) -> Result<Vec<Value>> {
    let transaction = driver
        .transaction(database, typedb_driver::TransactionType::Write)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create write transaction: {}", e))?;

    let answer = transaction
        .query(query)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute write query: {}", e))?;

    let rows = collect_rows(answer).await?;

    transaction
        .commit()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to commit write transaction: {}", e))?;

    Ok(rows)
}

async fn execute_schema(driver: &TypeDBDriver, database: &str, query: &str) -> Result<Vec<Value>> {
    let transaction = driver
        .transaction(database, typedb_driver::TransactionType::Schema)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create schema transaction: {}", e))?;

    let _answer = transaction
        .query(query)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute schema query: {}", e))?;

    transaction
        .commit()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to commit schema transaction: {}", e))?;

    Ok(Vec::new())
}

async fn collect_rows(answer: typedb_driver::answer::QueryAnswer) -> Result<Vec<Value>> {
    let mut rows = Vec::new();
    let mut stream = answer.into_rows();

    while let Some(row_result) = stream.next().await {
        let row = row_result.map_err(|e| anyhow::anyhow!("Failed to get concept row: {}", e))?;
        let mut object = Map::new();

        for column_name in row.get_column_names() {
            if let Ok(Some(concept)) = row.get(column_name) {
                object.insert(column_name.clone(), concept_value(&concept));
            }
        }

        rows.push(Value::Object(object));
    }

    Ok(rows)
}

/// Flattens a TypeDB concept into plain JSON: attribute values become their
/// native JSON type, entities keep only their iid.
fn concept_value(concept: &typedb_driver::concept::Concept) -> Value {
    use typedb_driver::concept::Concept;

    match concept {
        Concept::Attribute(attr) => match &attr.value {
            typedb_driver::concept::value::Value::String(s) => Value::String(s.clone()),
            typedb_driver::concept::value::Value::Integer(i) => Value::from(*i),
            typedb_driver::concept::value::Value::Double(d) => Value::from(*d),
            typedb_driver::concept::value::Value::Boolean(b) => Value::Bool(*b),
            other => Value::String(other.to_string()),
        },
        Concept::Entity(entity) => {
            serde_json::json!({ "iid": entity.iid().to_string() })
        }
        other => Value::String(other.get_label().to_string()),
    }
}
