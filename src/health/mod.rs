//! Active health checking for backend servers.

mod monitor;
mod report;

pub use monitor::{probe, HealthMonitor, ProbeError};
pub use report::StatusReport;
