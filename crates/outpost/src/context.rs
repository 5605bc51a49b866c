// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by every subcommand.

use std::sync::Arc;
use std::time::Duration;

use outpost_config::OutpostConfig;
use outpost_core::{Clock, OutpostError, RemoteBackend, SystemClock};
use outpost_remote::RestBackend;
use outpost_storage::SqliteOutbox;
use outpost_sync::{
    ConnectivityMonitor, FlushEngine, FlushPolicy, Outbox, ReachabilityProbe, WriteDispatcher,
};
use tracing::debug;

/// The opened outbox plus the configuration it came from.
pub struct Context {
    pub config: OutpostConfig,
    pub store: Arc<SqliteOutbox>,
    pub outbox: Outbox,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    pub async fn open(config: OutpostConfig) -> Result<Self, OutpostError> {
        let store = Arc::new(SqliteOutbox::open(config.storage.clone()).await?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let outbox = Outbox::new(store.clone(), clock.clone());
        Ok(Self {
            config,
            store,
            outbox,
            clock,
        })
    }

    /// The configured HTTP backend, or `None` when `backend.url` is unset.
    pub fn backend(&self) -> Result<Option<Arc<RestBackend>>, OutpostError> {
        if self.config.backend.url.is_none() {
            return Ok(None);
        }
        RestBackend::new(&self.config.backend, &self.config.connectivity)
            .map(|backend| Some(Arc::new(backend)))
    }

    /// Like [`Context::backend`], but a missing URL is an error.
    pub fn require_backend(&self) -> Result<Arc<RestBackend>, OutpostError> {
        self.backend()?.ok_or_else(|| {
            OutpostError::Config("backend.url is not set; the outbox is local-only".into())
        })
    }

    pub fn probe(
        &self,
        backend: Arc<dyn RemoteBackend>,
        monitor: ConnectivityMonitor,
    ) -> ReachabilityProbe {
        ReachabilityProbe::new(
            backend,
            monitor,
            Duration::from_secs(self.config.connectivity.probe_interval_secs),
        )
    }

    /// Probe the backend once and return a monitor holding the result.
    pub async fn connect(&self, backend: Arc<dyn RemoteBackend>) -> ConnectivityMonitor {
        let monitor = ConnectivityMonitor::new(false);
        let online = self.probe(backend, monitor.clone()).check_once().await;
        debug!(online, "initial reachability probe");
        monitor
    }

    pub fn dispatcher(
        &self,
        backend: Arc<dyn RemoteBackend>,
        monitor: ConnectivityMonitor,
    ) -> WriteDispatcher {
        WriteDispatcher::new(self.outbox.clone(), backend, monitor)
    }

    pub fn engine(
        &self,
        backend: Arc<dyn RemoteBackend>,
        monitor: ConnectivityMonitor,
    ) -> FlushEngine {
        FlushEngine::new(
            self.outbox.clone(),
            backend,
            monitor,
            FlushPolicy::from(&self.config.outbox),
        )
    }

    /// Checkpoint the database before exit.
    pub async fn close(&self) -> Result<(), OutpostError> {
        self.store.close().await
    }
}
