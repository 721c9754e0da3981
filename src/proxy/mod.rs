//! Backend connections and request/response forwarding.

mod exchange;

pub use exchange::{
    connect_to_backend, exchange_once, ExchangeResult, ExchangeStep, ProxyError,
};
