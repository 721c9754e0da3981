//! Utility functions and helpers.

mod connection_id;
mod logging;
mod shutdown;

pub use connection_id::ConnectionId;
pub use logging::init_logging;
pub use shutdown::ShutdownSignal;
