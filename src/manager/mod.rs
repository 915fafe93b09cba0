//! Manager: accepts events, schedules them onto workers, and reconciles
//! observed state back into its own store.

mod api;
#[allow(clippy::module_inception)]
mod manager;
mod types;

pub use api::ManagerServer;
pub use manager::{
    run_dispatch_loop, run_health_check_loop, run_reconcile_loop, DISPATCH_INTERVAL,
    HEALTH_CHECK_INTERVAL, RECONCILE_INTERVAL,
};
pub use types::{Manager, ManagerError};
