//! healthlb - a health-aware round-robin TCP load balancer
//!
//! Each client connection is sent to the next healthy backend in round-robin
//! order, failing over to the following backends if a connect fails, and one
//! request/response exchange is forwarded. A background monitor probes every
//! backend on a fixed interval and flips its health flag.

pub mod backend;
pub mod config;
pub mod frontend;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod server;
pub mod state;
pub mod util;

pub use config::Config;
pub use server::LoadBalancer;
