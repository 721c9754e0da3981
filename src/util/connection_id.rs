//! Connection identifiers for log correlation.
//!
//! Every accepted client connection gets an id that is carried on each log
//! event emitted while dispatching it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for short connection IDs.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier attached to one client connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Process-local id: `conn-` followed by a zero-padded hex counter.
    pub fn next() -> Self {
        let count = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn-{:012x}", count))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
