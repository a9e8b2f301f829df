//! tally-tenant: the tenant-resolution core.
//!
//! Two pieces:
//! - [`ConnectionPool`]: at most one live backend handle per organization
//!   slug, provisioned lazily and torn down explicitly.
//! - [`TenantManager`]: owns the "current organization" state, serializes
//!   switches, and publishes tenant lifecycle events.

pub mod manager;
pub mod pool;

pub use manager::{Navigation, TenantManager};
pub use pool::ConnectionPool;
