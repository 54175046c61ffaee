// src/health/checker.rs
use super::probe::{HealthProbe, ProbeResult};
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically probes every backend in the pool and publishes the result.
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    probe: HealthProbe,
    interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, probe: HealthProbe, interval: Duration) -> Self {
        Self {
            pool,
            probe,
            interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Runs probe cycles until `cancel` fires. The first cycle starts
    /// immediately; a cancelled cycle is abandoned mid-flight.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = ?self.interval,
            timeout = ?self.probe.timeout(),
            backends = self.pool.len(),
            "Starting health monitor"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.check_all() => {}
            }
        }

        info!("Health monitor shutting down");
    }

    /// Probes all backends concurrently and waits for every result.
    pub async fn check_all(&self) -> Vec<ProbeResult> {
        let checks = self
            .pool
            .backends()
            .iter()
            .map(|backend| self.check_backend(backend));
        let results = futures::future::join_all(checks).await;

        let healthy_count = results.iter().filter(|r| r.healthy).count();
        let total_count = results.len();

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(healthy_count, total_count);
        }

        debug!(
            "Health check complete: {} healthy, {} unhealthy",
            healthy_count,
            total_count - healthy_count
        );

        results
    }

    async fn check_backend(&self, backend: &Arc<Backend>) -> ProbeResult {
        let result = self.probe.check(&backend.address).await;

        let previous = self.pool.set_healthy(&backend.address, result.healthy);
        let was_healthy = previous.map(|state| state.healthy).unwrap_or(false);
        let first_check = previous.map_or(true, |state| state.last_checked_at.is_none());

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&backend.address, result.healthy);
        }

        match (was_healthy, result.healthy) {
            (false, true) => info!(
                backend = %backend.address,
                elapsed = ?result.elapsed,
                "Backend is now healthy"
            ),
            (true, false) => warn!(
                backend = %backend.address,
                error = ?result.error,
                "Backend is now unhealthy"
            ),
            (false, false) if first_check => warn!(
                backend = %backend.address,
                error = ?result.error,
                "Backend failed its first health check"
            ),
            _ => debug!(
                backend = %backend.address,
                healthy = result.healthy,
                elapsed = ?result.elapsed,
                "Health check"
            ),
        }

        result
    }
}
