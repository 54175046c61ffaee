// src/proxy/mod.rs
mod backend;
mod forwarder;
mod pool;
mod proxy;

pub use backend::{Backend, HealthState};
pub use forwarder::{ForwardError, Forwarder, DEFAULT_MAX_BODY_BYTES, LB_FROM};
pub use pool::{BackendPool, BackendSnapshot, PoolError};
pub use proxy::{Outcome, Proxy, ProxyError};
