//! Client-facing side of the balancer.
//!
//! The listener accepts client connections and spawns one dispatch task per
//! connection; the dispatcher picks a backend and forwards a single exchange.

mod dispatcher;
mod listener;

pub use dispatcher::{DispatchOutcome, Dispatcher, SERVICE_UNAVAILABLE};
pub use listener::FrontendListener;
