//! Backend registry.
//!
//! Holds the fixed, ordered backend pool and the mutable per-backend state
//! shared by the dispatcher and the health monitor. Backends are addressed by
//! their registration index; endpoints are not required to be unique.

use crate::config::BackendConfig;
use parking_lot::RwLock;
use std::fmt;

/// Identity of a backend. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendEndpoint {
    host: String,
    port: u16,
}

impl BackendEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<&BackendConfig> for BackendEndpoint {
    fn from(config: &BackendConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub index: usize,
    pub endpoint: BackendEndpoint,
    pub healthy: bool,
    pub request_count: u64,
}

/// Mutable per-backend state, one slot per registered endpoint.
#[derive(Debug)]
struct BackendTable {
    healthy: Vec<bool>,
    request_counts: Vec<u64>,
}

/// Fixed backend pool with per-index health and request counters.
///
/// Health flags and counters live behind a single lock, so every read and
/// write is linearizable with respect to every other.
#[derive(Debug)]
pub struct BackendRegistry {
    endpoints: Vec<BackendEndpoint>,
    table: RwLock<BackendTable>,
}

impl BackendRegistry {
    /// Register backends in the given order. All start healthy with zero requests.
    pub fn new(endpoints: Vec<BackendEndpoint>) -> Self {
        let len = endpoints.len();
        Self {
            endpoints,
            table: RwLock::new(BackendTable {
                healthy: vec![true; len],
                request_counts: vec![0; len],
            }),
        }
    }

    /// Build a registry from the configured backend list.
    pub fn from_config(backends: &[BackendConfig]) -> Self {
        Self::new(backends.iter().map(BackendEndpoint::from).collect())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoint registered at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn endpoint(&self, index: usize) -> &BackendEndpoint {
        &self.endpoints[index]
    }

    /// All endpoints in registration order.
    pub fn endpoints(&self) -> &[BackendEndpoint] {
        &self.endpoints
    }

    /// Indices of backends currently marked healthy, in registration order.
    pub fn snapshot_healthy(&self) -> Vec<usize> {
        let table = self.table.read();
        table
            .healthy
            .iter()
            .enumerate()
            .filter_map(|(index, &healthy)| healthy.then_some(index))
            .collect()
    }

    pub fn is_healthy(&self, index: usize) -> bool {
        self.table.read().healthy[index]
    }

    /// Set the health flag for `index`, returning the previous value.
    pub fn set_health(&self, index: usize, healthy: bool) -> bool {
        let mut table = self.table.write();
        std::mem::replace(&mut table.healthy[index], healthy)
    }

    /// Count one successfully proxied exchange for `index`.
    pub fn increment_request_count(&self, index: usize) {
        let mut table = self.table.write();
        table.request_counts[index] += 1;
    }

    pub fn request_count(&self, index: usize) -> u64 {
        self.table.read().request_counts[index]
    }

    /// Consistent view of every backend, taken under one read lock.
    pub fn status(&self) -> Vec<BackendStatus> {
        let table = self.table.read();
        debug_assert_eq!(table.healthy.len(), self.endpoints.len());
        debug_assert_eq!(table.request_counts.len(), self.endpoints.len());

        self.endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| BackendStatus {
                index,
                endpoint: endpoint.clone(),
                healthy: table.healthy[index],
                request_count: table.request_counts[index],
            })
            .collect()
    }
}
