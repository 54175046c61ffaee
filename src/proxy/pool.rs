// src/proxy/pool.rs
use super::backend::{Backend, HealthState};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("backend pool must contain at least one backend")]
    Empty,

    #[error("backend {0} is listed more than once")]
    Duplicate(String),
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSnapshot {
    pub address: String,
    pub healthy: bool,
    pub last_checked_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Fixed, ordered set of backends. Ring position is the index in this list.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
}

impl BackendPool {
    pub fn new<I, S>(addresses: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut backends = Vec::new();

        for address in addresses {
            let address = address.into();
            if !seen.insert(address.clone()) {
                return Err(PoolError::Duplicate(address));
            }
            backends.push(Arc::new(Backend::new(address)));
        }

        if backends.is_empty() {
            return Err(PoolError::Empty);
        }

        Ok(Self { backends })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Backend>> {
        self.backends.get(index)
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Copies every backend's health in ring order.
    pub fn list(&self) -> Vec<BackendSnapshot> {
        self.backends
            .iter()
            .map(|backend| {
                let HealthState {
                    healthy,
                    last_checked_at,
                } = backend.health();
                BackendSnapshot {
                    address: backend.address.clone(),
                    healthy,
                    last_checked_at,
                }
            })
            .collect()
    }

    /// Health flags only, in ring order.
    pub fn health_flags(&self) -> Vec<bool> {
        self.backends.iter().map(|b| b.is_healthy()).collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy()).count()
    }

    /// Sets the health of the backend at `address`. Returns the previous state,
    /// or `None` if no such backend exists.
    pub fn set_healthy(&self, address: &str, healthy: bool) -> Option<HealthState> {
        match self.backends.iter().find(|b| b.address == address) {
            Some(backend) => Some(backend.update_health(healthy)),
            None => {
                tracing::error!(backend = %address, "health update for unknown backend ignored");
                None
            }
        }
    }
}
