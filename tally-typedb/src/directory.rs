use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use typedb_driver::{Credentials, DriverOptions, TypeDBDriver};

use tally_core::directory::CentralDirectory;
use tally_core::errors::TallyError;
use tally_core::tenant::{ConnectionConfig, OrgSlug, OrgStatus, OrganizationRecord};

use crate::query::{execute_query, quote, QueryKind};

/// Schema of the shared directory database.
pub const DIRECTORY_SCHEMA: &str = "define\n\
    attribute slug value string;\n\
    attribute name value string;\n\
    attribute config value string;\n\
    attribute status value string;\n\
    attribute user-id value string;\n\
    entity organization, owns slug @key, owns name, owns config, owns status;\n\
    entity member-grant, owns user-id, owns slug;";

/// Central directory backed by one shared TypeDB database.
pub struct TypeDbDirectory {
    driver: Arc<TypeDBDriver>,
    database: String,
}

impl TypeDbDirectory {
    pub async fn connect(
        address: &str,
        username: &str,
        password: &str,
        tls: bool,
        database: &str,
    ) -> Result<Self> {
        let options = DriverOptions::new(tls, None).map_err(|e| anyhow!(e))?;
        let driver = TypeDBDriver::new(address, Credentials::new(username, password), options)
            .await
            .map_err(|e| anyhow!(e))?;

        let directory = Self {
            driver: Arc::new(driver),
            database: database.to_string(),
        };
        directory.ensure_schema().await?;
        Ok(directory)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let databases = self.driver.databases().all().await.map_err(|e| anyhow!(e))?;
        let exists = databases.iter().any(|db| db.name() == self.database);
        if !exists {
            info!(database = %self.database, "creating directory database");
            self.driver
                .databases()
                .create(&self.database)
                .await
                .map_err(|e| anyhow!(e))?;
        }

        // Always apply; define is additive and keeps existing data.
        execute_query(
            &self.driver,
            &self.database,
            DIRECTORY_SCHEMA,
            QueryKind::Schema,
        )
        .await?;
        Ok(())
    }

    fn row_str<'a>(row: &'a Value, column: &str) -> Result<&'a str> {
        row.get(column)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("directory row is missing column: {column}"))
    }

    fn record_from_row(slug: OrgSlug, row: &Value) -> Result<OrganizationRecord> {
        let name = Self::row_str(row, "name")?.to_string();
        let config: Value = serde_json::from_str(Self::row_str(row, "config")?)
            .map_err(|e| anyhow!("stored connection config is not valid JSON: {}", e))?;
        let status = match Self::row_str(row, "status")? {
            "disabled" => OrgStatus::Disabled,
            _ => OrgStatus::Active,
        };

        Ok(OrganizationRecord {
            slug,
            name,
            connection_config: ConnectionConfig::new(config),
            status,
        })
    }
}

#[async_trait]
impl CentralDirectory for TypeDbDirectory {
    async fn get_organization(&self, slug: &OrgSlug) -> Result<OrganizationRecord> {
        let query = format!(
            "match $o isa organization, has slug {}, has name $name, has config $config, \
             has status $status; select $name, $config, $status;",
            quote(slug.as_str())
        );
        let rows = execute_query(&self.driver, &self.database, &query, QueryKind::Read).await?;

        let row = rows.first().ok_or_else(|| {
            TallyError::not_found(format!("organization not found: {slug}")).into_anyhow()
        })?;
        Self::record_from_row(slug.clone(), row)
    }

    async fn membership(&self, user_id: &str) -> Result<Vec<OrgSlug>> {
        let query = format!(
            "match $g isa member-grant, has user-id {}, has slug $slug; select $slug;",
            quote(user_id)
        );
        let rows = execute_query(&self.driver, &self.database, &query, QueryKind::Read).await?;

        rows.iter()
            .map(|row| Ok(OrgSlug(Self::row_str(row, "slug")?.to_string())))
            .collect()
    }

    async fn all_organizations(&self) -> Result<Vec<OrganizationRecord>> {
        let query = "match $o isa organization, has slug $slug, has name $name, \
                     has config $config, has status $status; \
                     select $slug, $name, $config, $status;";
        let rows = execute_query(&self.driver, &self.database, query, QueryKind::Read).await?;

        rows.iter()
            .map(|row| {
                let slug = OrgSlug(Self::row_str(row, "slug")?.to_string());
                Self::record_from_row(slug, row)
            })
            .collect()
    }

    async fn upsert_organization(&self, record: OrganizationRecord) -> Result<()> {
        // Replace-then-insert; slugs are immutable so the key never changes.
        let delete = format!(
            "match $o isa organization, has slug {}; delete $o;",
            quote(record.slug.as_str())
        );
        execute_query(&self.driver, &self.database, &delete, QueryKind::Write).await?;

        let status = match record.status {
            OrgStatus::Active => "active",
            OrgStatus::Disabled => "disabled",
        };
        let config = serde_json::to_string(&record.connection_config.0)?;
        let insert = format!(
            "insert $o isa organization, has slug {}, has name {}, has config {}, has status {};",
            quote(record.slug.as_str()),
            quote(&record.name),
            quote(&config),
            quote(status)
        );
        execute_query(&self.driver, &self.database, &insert, QueryKind::Write).await?;
        Ok(())
    }

    async fn grant(&self, user_id: &str, slug: &OrgSlug) -> Result<()> {
        let existing = format!(
            "match $g isa member-grant, has user-id {}, has slug {}; select $g;",
            quote(user_id),
            quote(slug.as_str())
        );
        let rows =
            execute_query(&self.driver, &self.database, &existing, QueryKind::Read).await?;
        if !rows.is_empty() {
            return Ok(());
        }

        let insert = format!(
            "insert $g isa member-grant, has user-id {}, has slug {};",
            quote(user_id),
            quote(slug.as_str())
        );
        execute_query(&self.driver, &self.database, &insert, QueryKind::Write).await?;
        Ok(())
    }

    async fn revoke(&self, user_id: &str, slug: &OrgSlug) -> Result<()> {
        let delete = format!(
            "match $g isa member-grant, has user-id {}, has slug {}; delete $g;",
            quote(user_id),
            quote(slug.as_str())
        );
        execute_query(&self.driver, &self.database, &delete, QueryKind::Write).await?;
        Ok(())
    }
}
