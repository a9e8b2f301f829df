use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use typedb_driver::{Credentials, DriverOptions, TypeDBDriver};

use tally_core::errors::TallyError;
use tally_core::provision::ConnectionProvisioner;
use tally_core::store::TenantStore;
use tally_core::tenant::{ConnectionConfig, OrganizationRecord};

use crate::query::{execute_query, QueryKind};
use crate::store::{TypeDbStore, RECORD_SCHEMA};

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

/// The shape Tally expects inside an organization's connection config when
/// the TypeDB backend is in use.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantDbConfig {
    pub address: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub tls: bool,
    pub database: String,
}

impl TenantDbConfig {
    /// Decode the opaque capability bundle. A bundle that does not decode is
    /// a misconfigured tenant record, not a transport problem.
    pub fn from_connection_config(config: &ConnectionConfig) -> Result<Self> {
        serde_json::from_value(config.0.clone()).map_err(|e| {
            TallyError::config(format!("malformed connection config: {e}")).into_anyhow()
        })
    }
}

/// Provisions one TypeDB database per tenant.
pub struct TypeDbProvisioner;

impl TypeDbProvisioner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TypeDbProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionProvisioner for TypeDbProvisioner {
    async fn provision(&self, org: &OrganizationRecord) -> Result<Arc<dyn TenantStore>> {
        let cfg = TenantDbConfig::from_connection_config(&org.connection_config)?;

        let options = DriverOptions::new(cfg.tls, None).map_err(|e| anyhow!(e))?;
        let driver = TypeDBDriver::new(
            &cfg.address,
            Credentials::new(&cfg.username, &cfg.password),
            options,
        )
        .await
        .map_err(|e| {
            TallyError::transient_io(format!(
                "could not reach tenant database for {}: {e}",
                org.slug
            ))
            .into_anyhow()
        })?;

        // Create the tenant database on first use and make sure the record
        // schema is present.
        let databases = driver.databases().all().await.map_err(|e| anyhow!(e))?;
        let exists = databases.iter().any(|db| db.name() == cfg.database);
        if !exists {
            info!(slug = %org.slug, database = %cfg.database, "creating tenant database");
            driver
                .databases()
                .create(&cfg.database)
                .await
                .map_err(|e| anyhow!(e))?;
        }
        execute_query(&driver, &cfg.database, RECORD_SCHEMA, QueryKind::Schema).await?;

        Ok(Arc::new(TypeDbStore::new(Arc::new(driver), cfg.database)))
    }
}
