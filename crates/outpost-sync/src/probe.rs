// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reachability probe feeding the connectivity monitor.
//!
//! The probe only updates connectivity state. Flushes still start from the
//! scheduler's reconnect edge, never from the probe's timer.

use std::sync::Arc;
use std::time::Duration;

use outpost_core::{HealthStatus, RemoteBackend};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connectivity::ConnectivityMonitor;

/// Polls the backend's health check on an interval.
pub struct ReachabilityProbe {
    backend: Arc<dyn RemoteBackend>,
    monitor: ConnectivityMonitor,
    interval: Duration,
}

impl ReachabilityProbe {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        monitor: ConnectivityMonitor,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            monitor,
            interval,
        }
    }

    /// Probe once and publish the result. Returns whether the backend
    /// looked reachable.
    pub async fn check_once(&self) -> bool {
        let reachable = match self.backend.health_check().await {
            Ok(HealthStatus::Healthy | HealthStatus::Degraded(_)) => true,
            Ok(HealthStatus::Unhealthy(reason)) => {
                debug!(%reason, "backend unreachable");
                false
            }
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        };
        self.monitor.set_online(reachable);
        reachable
    }

    /// Probe immediately, then every interval, until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.check_once().await;
                    }
                }
            }
            debug!("reachability probe stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_test_utils::MockBackend;

    #[tokio::test]
    async fn check_once_tracks_backend_reachability() {
        let backend = Arc::new(MockBackend::new());
        let monitor = ConnectivityMonitor::new(false);
        let probe = ReachabilityProbe::new(backend.clone(), monitor.clone(), Duration::from_secs(1));

        assert!(probe.check_once().await);
        assert!(monitor.is_online());

        backend.set_reachable(false);
        assert!(!probe.check_once().await);
        assert!(!monitor.is_online());
        assert_eq!(monitor.state().reconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_probe_runs_on_interval_until_shutdown() {
        let backend = Arc::new(MockBackend::new());
        backend.set_reachable(false);
        let monitor = ConnectivityMonitor::new(true);
        let shutdown = CancellationToken::new();
        let handle = ReachabilityProbe::new(backend.clone(), monitor.clone(), Duration::from_secs(15))
            .spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!monitor.is_online());

        backend.set_reachable(true);
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(monitor.is_online());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
