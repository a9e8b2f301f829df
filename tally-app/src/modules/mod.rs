//! Feature modules of the contribution manager.
//!
//! Each module builds its service from the active tenant connection when
//! the tenant becomes ready; no module touches records of a tenant that is
//! not current.

use std::sync::Arc;

use tally_core::registry::FeatureModule;

pub mod contributions;
pub mod expenses;
pub mod members;

pub use contributions::ContributionsModule;
pub use expenses::ExpensesModule;
pub use members::MembersModule;

pub fn default_modules() -> Vec<Arc<dyn FeatureModule>> {
    vec![
        Arc::new(MembersModule),
        Arc::new(ContributionsModule),
        Arc::new(ExpensesModule),
    ]
}
