// src/load_balancer/router.rs
use super::hash::hash_key;
use crate::proxy::{Backend, BackendPool};
use std::sync::Arc;

/// Backend chosen for a routing key.
#[derive(Debug, Clone)]
pub struct Selection {
    pub backend: Arc<Backend>,
    /// Ring index the key hashes to.
    pub home: usize,
    /// Ring index actually chosen.
    pub index: usize,
}

impl Selection {
    pub fn failed_over(&self) -> bool {
        self.home != self.index
    }
}

/// Sticky key-to-backend assignment with ring-order failover.
#[derive(Debug, Clone)]
pub struct Router {
    pool: Arc<BackendPool>,
}

impl Router {
    pub fn new(pool: Arc<BackendPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Index the key maps to before any failover.
    pub fn home_index(&self, key: &str) -> usize {
        home_index(hash_key(key), self.pool.len())
    }

    /// Picks the serving backend for `key` from the current pool state, or
    /// `None` when no backend is healthy.
    pub fn route(&self, key: &str) -> Option<Selection> {
        let flags = self.pool.health_flags();
        let home = home_index(hash_key(key), flags.len());
        let index = first_healthy_from(&flags, home)?;

        let backend = self.pool.get(index)?.clone();
        if index != home {
            tracing::debug!(
                key,
                home = %self.pool.get(home).map(|b| b.address.as_str()).unwrap_or("?"),
                backend = %backend.address,
                "home backend unhealthy, failing over"
            );
        }

        Some(Selection {
            backend,
            home,
            index,
        })
    }
}

pub fn home_index(hash: u32, len: usize) -> usize {
    (hash as u64 % len as u64) as usize
}

/// Scans `flags` in ring order starting at `home`, visiting each slot once.
pub fn first_healthy_from(flags: &[bool], home: usize) -> Option<usize> {
    let len = flags.len();
    (0..len)
        .map(|offset| (home + offset) % len)
        .find(|&index| flags[index])
}
