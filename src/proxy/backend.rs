// src/proxy/backend.rs
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Health of a single backend as last published by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl HealthState {
    /// A backend nobody has probed yet is not routable.
    pub const UNCHECKED: HealthState = HealthState {
        healthy: false,
        last_checked_at: None,
    };
}

#[derive(Debug)]
pub struct Backend {
    pub address: String,
    health: ArcSwap<HealthState>,
}

impl Backend {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            health: ArcSwap::from_pointee(HealthState::UNCHECKED),
        }
    }

    pub fn health(&self) -> HealthState {
        **self.health.load()
    }

    pub fn is_healthy(&self) -> bool {
        self.health.load().healthy
    }

    /// Publishes a new health state and returns the previous one.
    pub fn update_health(&self, healthy: bool) -> HealthState {
        let next = HealthState {
            healthy,
            last_checked_at: Some(Utc::now()),
        };
        *self.health.swap(Arc::new(next))
    }
}
