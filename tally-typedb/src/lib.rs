//! tally-typedb: TypeDB backend for Tally.
//!
//! Implements the three backend seams against TypeDB:
//! - [`TypeDbDirectory`]: the shared central directory database
//! - [`TypeDbProvisioner`]: one TypeDB database per tenant, connected from
//!   the organization's connection config
//! - [`TypeDbStore`]: the per-tenant record store over a generic
//!   record-document scheme

pub mod directory;
pub mod provision;
pub mod query;
pub mod store;

pub use directory::TypeDbDirectory;
pub use provision::{TenantDbConfig, TypeDbProvisioner};
pub use query::{execute_query, quote, QueryKind};
pub use store::TypeDbStore;
