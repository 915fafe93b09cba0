//! Worker: consumes a local task queue, drives the runtime adapter, and
//! publishes state and stats over HTTP.

mod api;
mod types;
#[allow(clippy::module_inception)]
mod worker;

pub use api::WorkerServer;
pub use types::{ErrResponse, Worker, WorkerError};
pub use worker::{
    run_execute_loop, run_inspect_loop, run_stats_loop, EXECUTE_INTERVAL, INSPECT_INTERVAL,
    STATS_INTERVAL,
};
