//! Backend pool state and round-robin selection.

mod registry;
mod round_robin;

pub use registry::{BackendEndpoint, BackendRegistry, BackendStatus};
pub use round_robin::{rotation, RoundRobinCursor};
