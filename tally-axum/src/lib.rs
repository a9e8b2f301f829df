//! tally-axum: Axum adapter for Tally.
//!
//! Resolves the tenant from the request location, drives the tenant
//! manager, and dispatches tenant-scoped REST calls to the active service
//! registry. Also mounts the directory and session surfaces.

pub mod app;
pub mod directory;
pub mod error;
pub mod resolve;
pub mod rest;
pub mod state;

pub use app::TenantRouter;
pub use error::TallyAxumError;
pub use resolve::{extract_slug, resolve_route, NavigationState, Resolution};
pub use state::TenantAppState;
