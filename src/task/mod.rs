//! Task entities and the state machine that governs them.

mod state;
mod types;

pub use state::valid_state_transition;
pub use types::{
    Config, HostPort, HostPortMap, PortMapping, RestartPolicy, State, Task, TaskEvent,
};
