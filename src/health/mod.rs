// src/health/mod.rs
mod checker;
mod probe;

pub use checker::HealthMonitor;
pub use probe::{HealthProbe, ProbeResult};
