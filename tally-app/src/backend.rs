use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use tally_core::adapters::{journal, MemoryDirectory, MemoryProvisioner};
use tally_core::config::ConfigSnapshot;
use tally_core::directory::CentralDirectory;
use tally_core::errors::TallyError;
use tally_core::provision::ConnectionProvisioner;
use tally_core::tenant::{ConnectionConfig, OrgSlug, OrganizationRecord};
use tally_typedb::{TypeDbDirectory, TypeDbProvisioner};

/// Pick the directory + provisioner pair for the configured backend.
pub async fn select(
    config: &ConfigSnapshot,
) -> Result<(Arc<dyn CentralDirectory>, Arc<dyn ConnectionProvisioner>)> {
    match config.get_or("storage.backend", "memory") {
        "typedb" => {
            let directory: Arc<dyn CentralDirectory> = Arc::new(
                TypeDbDirectory::connect(
                    config.get_or("typedb.address", "127.0.0.1:1729"),
                    config.get_or("typedb.username", "admin"),
                    config.get_or("typedb.password", "password"),
                    config.get_bool("typedb.tls").unwrap_or(false),
                    config.get_or("typedb.directory-database", "tally-directory"),
                )
                .await?,
            );
            let provisioner: Arc<dyn ConnectionProvisioner> = Arc::new(TypeDbProvisioner::new());
            Ok((directory, provisioner))
        }
        "memory" => {
            let directory = Arc::new(MemoryDirectory::new());
            seed_demo(&directory).await?;
            let provisioner: Arc<dyn ConnectionProvisioner> =
                Arc::new(MemoryProvisioner::new(journal()));
            Ok((directory as Arc<dyn CentralDirectory>, provisioner))
        }
        other => Err(TallyError::config(format!("unknown storage backend: {other}")).into_anyhow()),
    }
}

/// The memory backend starts with two demo organizations so the app is
/// explorable without any setup.
async fn seed_demo(directory: &MemoryDirectory) -> Result<()> {
    for (slug, name) in [("acme", "ACME Works"), ("globex", "Globex Club")] {
        let slug = OrgSlug::parse(slug)?;
        directory
            .seed(OrganizationRecord::new(
                slug.clone(),
                name,
                ConnectionConfig::new(json!({"backend": "memory"})),
            ))
            .await;
        directory.grant("demo-user", &slug).await?;
    }
    info!("seeded demo directory (acme, globex)");
    Ok(())
}
